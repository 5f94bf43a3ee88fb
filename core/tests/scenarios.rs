//! End-to-end command scenarios

use jcre_core::{apdu::State, util, ApduSession, Error, MemStore, Memory};

mod helpers;
use helpers::*;

/// Case 1 command, no data to receive
#[test]
fn case_1_receive() -> anyhow::Result<()> {
    init_log();

    let mut t = t0(&short_apdu(0x00, 0x70, 0x00, 0x00, &[], None));
    let mut b = buffer();

    let mut s = ApduSession::open(&mut t, &mut b, false)?;
    assert_eq!(s.incoming_length(), 0);
    assert_eq!(s.set_incoming_and_receive()?, 0);
    assert_eq!(s.state(), State::FullIncoming);

    Ok(())
}

/// T=0 response length beyond 256 without extended length support
#[test]
fn t0_response_too_long() -> anyhow::Result<()> {
    init_log();

    let mut t = t0(&short_apdu(0x00, 0xCA, 0x00, 0x00, &[], Some(0x00)));
    let mut b = buffer();

    let mut s = ApduSession::open(&mut t, &mut b, false)?;
    s.set_outgoing()?;

    assert_eq!(s.set_outgoing_length(300), Err(Error::BadLength));
    assert_eq!(s.state(), State::Outgoing);

    Ok(())
}

/// Atomic copy joins the caller's transaction
#[test]
fn array_copy_in_transaction() -> anyhow::Result<()> {
    init_log();

    let mut mem = Memory::new(MemStore::new(64), 128);

    mem.begin_transaction()?;

    let src = payload(12);
    assert_eq!(util::array_copy(&mut mem, &src, 2, 16, 8)?, 24);

    // Not committed by the helper
    assert_eq!(mem.transaction_depth(), 1);
    assert_eq!(mem.journal().pending(), 1);
    assert_eq!(mem.unused_commit_capacity(), 120);
    assert_eq!(snapshot(&mem), vec![0u8; 64]);

    mem.commit_transaction()?;

    let mut expected = vec![0u8; 64];
    expected[16..24].copy_from_slice(&src[2..10]);
    assert_eq!(snapshot(&mem), expected);
    assert_eq!(mem.transaction_depth(), 0);

    Ok(())
}

/// No further send after a one-shot response
#[test]
fn send_after_one_shot() -> anyhow::Result<()> {
    init_log();

    let mut t = t1(&short_apdu(0x00, 0xCA, 0x00, 0x00, &[], Some(0x0A)));
    let mut b = buffer();

    {
        let mut s = ApduSession::open(&mut t, &mut b, false)?;
        s.set_outgoing_and_send(0, 10)?;

        assert_eq!(s.send_bytes(0, 5), Err(Error::IllegalUse));
        assert_eq!(s.state(), State::FullOutgoing);
    }

    assert_eq!(t.response().len(), 10);

    Ok(())
}
