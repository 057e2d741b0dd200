//! The small slice of the Redis wire protocol (RESP) the proxy speaks itself:
//! encoding the injected AUTH command and swallowing its one-line reply.
//! Everything else crosses the proxy as opaque bytes.

use crate::config::UpstreamCredentials;
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// Longest AUTH reply line accepted before giving up on the upstream
pub const MAX_REPLY_LINE: usize = 64 * 1024;

const CRLF: &[u8] = b"\r\n";

/// encode_command encodes a command as a RESP array of bulk strings
///
/// Length prefixes are byte lengths, so multi-byte UTF-8 arguments are
/// counted correctly.
pub fn encode_command(args: &[&[u8]]) -> Vec<u8> {
    // *<argc>\r\n then $<len>\r\n<arg>\r\n per argument
    let payload: usize = args.iter().map(|a| a.len() + 16).sum();
    let mut buf = Vec::with_capacity(16 + payload);

    buf.push(b'*');
    buf.extend_from_slice(args.len().to_string().as_bytes());
    buf.extend_from_slice(CRLF);

    for arg in args {
        buf.push(b'$');
        buf.extend_from_slice(arg.len().to_string().as_bytes());
        buf.extend_from_slice(CRLF);
        buf.extend_from_slice(arg);
        buf.extend_from_slice(CRLF);
    }

    buf
}

/// auth_command builds `AUTH <username> <password>` for the upstream
pub fn auth_command(creds: &UpstreamCredentials) -> Vec<u8> {
    encode_command(&[
        &b"AUTH"[..],
        creds.username.as_bytes(),
        creds.password.as_bytes(),
    ])
}

/// read_reply_line reads exactly one CRLF-terminated line and returns it,
/// terminator included. Bytes past the CRLF stay buffered in `reader`.
pub async fn read_reply_line<R>(reader: &mut R) -> io::Result<Vec<u8>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let mut limited = reader.take(MAX_REPLY_LINE as u64);

    loop {
        let n = limited.read_until(b'\n', &mut line).await?;

        if line.ends_with(CRLF) {
            return Ok(line);
        }

        if n == 0 {
            if limited.limit() == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("reply line longer than {MAX_REPLY_LINE} bytes"),
                ));
            }
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "upstream closed before completing its reply",
            ));
        }
    }
}

/// is_error_reply reports whether a reply line is a RESP simple error
pub fn is_error_reply(line: &[u8]) -> bool {
    line.first() == Some(&b'-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, BufReader};

    fn creds(username: &str, password: &str) -> UpstreamCredentials {
        UpstreamCredentials {
            host: "localhost".into(),
            port: 6379,
            username: username.into(),
            password: password.into(),
        }
    }

    #[test]
    fn encodes_auth_command() {
        let cmd = auth_command(&creds("default", "hunter2"));
        assert_eq!(
            cmd,
            b"*3\r\n$4\r\nAUTH\r\n$7\r\ndefault\r\n$7\r\nhunter2\r\n".to_vec()
        );
    }

    #[test]
    fn length_prefix_counts_bytes_not_chars() {
        // "üser" is 4 chars / 5 bytes, "пароль" is 6 chars / 12 bytes
        let cmd = auth_command(&creds("üser", "пароль"));
        let mut expected = b"*3\r\n$4\r\nAUTH\r\n$5\r\n".to_vec();
        expected.extend_from_slice("üser".as_bytes());
        expected.extend_from_slice(b"\r\n$12\r\n");
        expected.extend_from_slice("пароль".as_bytes());
        expected.extend_from_slice(b"\r\n");
        assert_eq!(cmd, expected);
    }

    #[test]
    fn encodes_empty_arguments() {
        assert_eq!(encode_command(&[&b"PING"[..], &b""[..]]), b"*2\r\n$4\r\nPING\r\n$0\r\n\r\n");
    }

    #[tokio::test]
    async fn reads_one_line_and_keeps_the_rest() {
        let data: &[u8] = b"+OK\r\n+PONG\r\n";
        let mut reader = BufReader::new(data);

        let line = read_reply_line(&mut reader).await.unwrap();
        assert_eq!(line, b"+OK\r\n");

        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest, b"+PONG\r\n");
    }

    #[tokio::test]
    async fn bare_newline_does_not_end_the_line() {
        let data: &[u8] = b"-ERR bad\nstill going\r\ntail";
        let mut reader = BufReader::new(data);

        let line = read_reply_line(&mut reader).await.unwrap();
        assert_eq!(line, b"-ERR bad\nstill going\r\n");
        assert!(is_error_reply(&line));
    }

    #[tokio::test]
    async fn eof_before_crlf_is_an_error() {
        let data: &[u8] = b"+OK";
        let mut reader = BufReader::new(data);

        let err = read_reply_line(&mut reader).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn overlong_line_is_rejected() {
        let data = vec![b'x'; MAX_REPLY_LINE + 10];
        let mut reader = BufReader::new(data.as_slice());

        let err = read_reply_line(&mut reader).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn recognises_error_replies() {
        assert!(is_error_reply(b"-WRONGPASS invalid username-password pair\r\n"));
        assert!(!is_error_reply(b"+OK\r\n"));
        assert!(!is_error_reply(b""));
    }
}
