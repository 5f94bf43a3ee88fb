// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Java Card runtime simulator
//!
//! Replays a [`Script`] of command APDUs through a [`Runtime`] hosting the
//! [`DemoApplet`], over a [`SimTransport`] with optional per-step fault and
//! power loss injection. Scripts are JSON, for example:
//!
//! ```json
//! {
//!   "link": { "protocol": "t1", "ifsc": 254, "ifsd": 254 },
//!   "runtime": { "buffer_size": 261, "commit_capacity": 512 },
//!   "store_size": 1024,
//!   "steps": [
//!     { "apdu": "80 10 0000 03 010203" },
//!     { "apdu": "80 20 0000 03" },
//!     { "apdu": "80 10 0000 02 0909", "tear_after": 1 },
//!     { "apdu": "80 20 0000 03" }
//!   ]
//! }
//! ```

use std::str::FromStr;

use log::{debug, info, warn};
use serde::{Deserialize, Deserializer, Serialize};
use strum::{Display, EnumString};

use jcre_core::{
    apdu::{Media, Protocol, ProtocolType},
    transport::Faults,
    Completion, Error, Link, MemStore, Runtime, RuntimeConfig, SimTransport, DEFAULT_BUFFER_SIZE,
    DEFAULT_COMMIT_CAPACITY,
};

mod applet;
pub use applet::{DemoApplet, Instruction, CLA_DEMO};

/// Default simulated store size in bytes
pub const DEFAULT_STORE_SIZE: usize = 1024;

/// Simulation script
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Script {
    /// Link parameters
    #[serde(default)]
    pub link: LinkOptions,

    /// Runtime configuration
    #[serde(default)]
    pub runtime: RuntimeOptions,

    /// Persistent store size in bytes
    #[serde(default = "default_store_size")]
    pub store_size: usize,

    /// Enable applet extended length support
    #[serde(default)]
    pub extended: bool,

    /// Commands to issue, in order
    pub steps: Vec<Step>,
}

/// Link configuration
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct LinkOptions {
    /// Transport protocol (`t0` or `t1`)
    #[serde(deserialize_with = "parse_str", serialize_with = "display_str")]
    pub protocol: ProtocolType,

    /// Transport media
    #[serde(
        default = "default_media",
        deserialize_with = "parse_str",
        serialize_with = "display_str"
    )]
    pub media: Media,

    /// Card information field size (T=1)
    #[serde(default = "default_ifs")]
    pub ifsc: usize,

    /// Device information field size (T=1)
    #[serde(default = "default_ifs")]
    pub ifsd: usize,

    /// Node address byte (T=1)
    #[serde(default)]
    pub nad: u8,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            protocol: ProtocolType::T1,
            media: Media::Default,
            ifsc: default_ifs(),
            ifsd: default_ifs(),
            nad: 0,
        }
    }
}

impl LinkOptions {
    /// Build and check link parameters for the simulated transport
    pub fn link(&self) -> Result<Link, Error> {
        let mut l = match self.protocol {
            ProtocolType::T0 => Link::t0(),
            ProtocolType::T1 => Link::t1(self.ifsc, self.ifsd),
        };

        l.protocol = Protocol::new(self.protocol, self.media);
        if self.protocol == ProtocolType::T1 {
            l.nad = self.nad;
        }

        l.validate()?;

        Ok(l)
    }
}

/// Runtime configuration
#[derive(Copy, Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct RuntimeOptions {
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    #[serde(default = "default_commit_capacity")]
    pub commit_capacity: usize,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            commit_capacity: DEFAULT_COMMIT_CAPACITY,
        }
    }
}

impl From<RuntimeOptions> for RuntimeConfig {
    fn from(o: RuntimeOptions) -> Self {
        RuntimeConfig {
            buffer_size: o.buffer_size,
            commit_capacity: o.commit_capacity,
        }
    }
}

/// Single scripted command
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Step {
    /// Hex encoded command APDU, whitespace is ignored
    pub apdu: String,

    /// Reader faults to inject
    #[serde(default)]
    pub faults: Vec<Fault>,

    /// Lose store power after this many further bytes are written
    #[serde(default)]
    pub tear_after: Option<usize>,
}

/// Reader fault names for scripts
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display, EnumString, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Fault {
    RxAbort,
    TxAbort,
    NoGetResponse,
    NoReissue,
    Io,
}

impl From<Fault> for Faults {
    fn from(f: Fault) -> Self {
        match f {
            Fault::RxAbort => Faults::RX_ABORT,
            Fault::TxAbort => Faults::TX_ABORT,
            Fault::NoGetResponse => Faults::NO_GET_RESPONSE,
            Fault::NoReissue => Faults::NO_REISSUE,
            Fault::Io => Faults::IO,
        }
    }
}

/// Recorded command / response exchange
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Exchange {
    /// Hex encoded command APDU
    pub apdu: String,
    /// Hex encoded response data
    pub response: String,
    /// Status word, `None` where the session ended silently
    pub sw: Option<u16>,
    /// Terminal session state where no status word was sent
    pub state: Option<String>,
    /// Whether the store was recovered before the command
    pub recovered: bool,
}

/// Run a script, returning the recorded exchanges
pub fn run_script(script: &Script) -> anyhow::Result<Vec<Exchange>> {
    let store = MemStore::new(script.store_size);
    let mut rt = Runtime::new(store, script.runtime.into())
        .map_err(|e| anyhow::anyhow!("invalid runtime configuration: {e}"))?;

    let mut applet = DemoApplet::new(script.extended);
    let link = script
        .link
        .link()
        .map_err(|e| anyhow::anyhow!("invalid link configuration: {e}"))?;

    debug!("link: {:?}", link);

    let mut exchanges = Vec::with_capacity(script.steps.len());

    for (i, step) in script.steps.iter().enumerate() {
        let frame = decode_hex(&step.apdu)?;

        // A torn store is reset and recovered before the next command
        let mut recovered = false;
        if !rt.memory().store().is_powered() {
            rt.memory_mut().store_mut().power_on();

            let r = rt
                .recover()
                .map_err(|e| anyhow::anyhow!("recovery failed: {e}"))?;
            info!("step {i}: power restored, {r}");

            recovered = true;
        }

        if let Some(n) = step.tear_after {
            rt.memory_mut().store_mut().arm_tear(n);
        }

        let faults = step
            .faults
            .iter()
            .fold(Faults::empty(), |a, f| a | Faults::from(*f));

        let mut t = SimTransport::new(link, &frame).with_faults(faults);

        let c = rt.process(&mut t, &mut applet);

        let (sw, state) = match c {
            Completion::Status(sw) => (Some(sw), None),
            Completion::Silent(s) => {
                warn!("step {i}: session ended in {s}, no status");
                (None, Some(s.to_string()))
            }
        };

        let response = hex::encode(t.response());

        info!(
            "step {i}: {} -> {} {}",
            hex::encode(&frame),
            response,
            sw.map(|v| format!("{v:04x}")).unwrap_or_else(|| "(silent)".to_string())
        );

        exchanges.push(Exchange {
            apdu: hex::encode(&frame),
            response,
            sw,
            state,
            recovered,
        });
    }

    Ok(exchanges)
}

/// Decode a hex string, ignoring whitespace
pub fn decode_hex(s: &str) -> anyhow::Result<Vec<u8>> {
    let s: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    let b = hex::decode(s)?;
    Ok(b)
}

fn parse_str<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let s = String::deserialize(d)?;
    T::from_str(&s).map_err(serde::de::Error::custom)
}

fn display_str<S, T>(v: &T, s: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
    T: std::fmt::Display,
{
    s.collect_str(v)
}

fn default_store_size() -> usize {
    DEFAULT_STORE_SIZE
}

fn default_media() -> Media {
    Media::Default
}

fn default_ifs() -> usize {
    jcre_core::transport::T1_DEFAULT_IFS
}

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

fn default_commit_capacity() -> usize {
    DEFAULT_COMMIT_CAPACITY
}

#[cfg(test)]
mod test {
    use super::*;

    fn script(steps: &[&str]) -> Script {
        Script {
            link: LinkOptions::default(),
            runtime: RuntimeOptions::default(),
            store_size: 64,
            extended: false,
            steps: steps
                .iter()
                .map(|s| Step {
                    apdu: s.to_string(),
                    faults: vec![],
                    tear_after: None,
                })
                .collect(),
        }
    }

    #[test]
    fn parse_script() {
        let s: Script = serde_json::from_str(
            r#"{
                "link": { "protocol": "t0", "media": "usb" },
                "steps": [
                    { "apdu": "80 01 0000 02 abcd" },
                    { "apdu": "80010000", "faults": ["no-get-response"], "tear_after": 4 }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(s.link.protocol, ProtocolType::T0);
        assert_eq!(s.link.media, Media::Usb);
        assert_eq!(s.link.ifsc, 254);
        assert_eq!(s.store_size, DEFAULT_STORE_SIZE);
        assert_eq!(s.runtime, RuntimeOptions::default());
        assert_eq!(s.steps[1].faults, vec![Fault::NoGetResponse]);
        assert_eq!(s.steps[1].tear_after, Some(4));

        let l = s.link.link().unwrap();
        assert_eq!(l.protocol.to_byte(), 0xA0);
        assert_eq!(l.out_block_size(), 258);
    }

    #[test]
    fn write_then_read() {
        let _ = simplelog::SimpleLogger::init(log::LevelFilter::Debug, Default::default());

        let x = run_script(&script(&[
            "80 10 0004 03 010203",
            "80 20 0004 03",
            "80 30 0004 02 0103",
            "80 40 0000",
        ]))
        .unwrap();

        assert_eq!(x[0].sw, Some(0x9000));
        assert_eq!(x[1].response, "010203");
        assert_eq!(x[1].sw, Some(0x9000));

        // 01 02 vs 01 03, stored byte is smaller
        assert_eq!(x[2].response, "01");

        // 512 unused of 512
        assert_eq!(x[3].response, "02000200");
    }

    #[test]
    fn link_sizes_checked() {
        for (ifsc, ifsd) in [(254, 0), (0, 254), (255, 32)] {
            let mut s = script(&["80 01 0000 01 aa 00"]);
            s.link.ifsc = ifsc;
            s.link.ifsd = ifsd;

            assert_eq!(s.link.link(), Err(Error::IllegalValue));
            assert!(run_script(&s).is_err());
        }

        // Information field sizes do not apply to T=0
        let mut s = script(&["80 01 0000 01 aa 00"]);
        s.link.protocol = ProtocolType::T0;
        s.link.ifsd = 0;

        let x = run_script(&s).unwrap();
        assert_eq!(x[0].response, "aa");
        assert_eq!(x[0].sw, Some(0x9000));
    }

    #[test]
    fn fill_region() {
        let x = run_script(&script(&[
            "80 11 0002 02 5503",
            "80 20 0000 06",
            "80 11 0000 01 55",
        ]))
        .unwrap();

        assert_eq!(x[0].sw, Some(0x9000));
        assert_eq!(x[1].response, "000055555500");
        assert_eq!(x[2].sw, Some(0x6700));
    }

    #[test]
    fn instruction_codes() {
        assert_eq!(Instruction::from_ins(0x10), Some(Instruction::Write));
        assert_eq!(Instruction::from_ins(0x40), Some(Instruction::Capacity));
        assert_eq!(Instruction::from_ins(0x02), None);
        assert_eq!(Instruction::Compare.to_string(), "compare");
    }

    #[test]
    fn rejected_commands() {
        let x = run_script(&script(&[
            "FF 01 0000",
            "80 7F 0000",
            "80 10 FFFF 01 01",
            "80 01 0000 04 01",
        ]))
        .unwrap();

        assert_eq!(x[0].sw, Some(0x6E00));
        assert_eq!(x[1].sw, Some(0x6D00));
        assert_eq!(x[2].sw, Some(0x6B00));
        assert_eq!(x[3].sw, Some(0x6700));
    }

    #[test]
    fn torn_write_recovered() {
        let _ = simplelog::SimpleLogger::init(log::LevelFilter::Debug, Default::default());

        let mut s = script(&["80 10 0000 02 0102", "80 10 0000 02 0909", "80 20 0000 02"]);
        s.steps[1].tear_after = Some(1);

        let x = run_script(&s).unwrap();

        assert_eq!(x[1].sw, Some(0x6F00));
        assert!(x[2].recovered);
        assert_eq!(x[2].response, "0102");
    }

    #[test]
    fn silent_on_abort() {
        let mut s = script(&["80 01 0000 02 abcd 00"]);
        s.steps[0].faults = vec![Fault::RxAbort];

        let x = run_script(&s).unwrap();

        assert_eq!(x[0].sw, None);
        assert_eq!(x[0].state.as_deref(), Some("ErrorT1IfdAbort"));
        assert!(x[0].response.is_empty());
    }
}
