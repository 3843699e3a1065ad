//! TCP send/disconnect primitives. Framing and resynchronization on read now live in
//! [`crate::fix::frame`], which generalizes past this module's original fixed `8=FIX.4.2`
//! assumption to every `BeginString` the protocol defines.

use crate::fix::log::Logger;
use crate::fix::mem::MsgBuf;
use crate::fix::SessionError;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

pub(super) async fn disconnect(mut stream: TcpStream) {
    _ = stream.set_linger(Some(tokio::time::Duration::from_secs(0)));
    _ = stream.shutdown().await;
    std::mem::drop(stream);
}

pub(super) async fn send_message<W: AsyncWrite + Unpin>(
    msg_buf: &MsgBuf,
    r: &mut W,
    _l: &mut impl Logger,
) -> Result<(), SessionError> {
    r.write_all(&msg_buf[..]).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::BrokenPipe {
            SessionError::TcpDisconnection
        } else {
            e.into()
        }
    })?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    struct MockLogger;
    impl Logger for MockLogger {
        fn log_message(&mut self, _: &MsgBuf) -> Result<(), SessionError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_send_message() {
        let mut mock_logger = MockLogger;
        let mut out: Vec<u8> = Vec::new();
        let msg: MsgBuf = b"8=FIX.4.2\x019=5\x0135=0\x0110=000\x01"[..].to_vec().into();
        send_message(&msg, &mut out, &mut mock_logger).await.unwrap();
        assert_eq!(out, msg.0);
    }
}
