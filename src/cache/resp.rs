//! Minimal RESP2 codec for the remote cache tier and the load client.
//!
//! Commands are encoded as arrays of bulk strings; replies are decoded into
//! [`RespValue`].

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// Decoded server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    Simple(String),
    Error(String),
    Integer(i64),
    /// `None` is the null bulk string (`$-1`).
    Bulk(Option<Bytes>),
    /// `None` is the null array (`*-1`).
    Array(Option<Vec<RespValue>>),
}

/// Errors raised while decoding replies.
#[derive(Debug, Error)]
pub enum RespError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection closed by server")]
    Eof,

    #[error("unknown reply type byte {0:#04x}")]
    InvalidPrefix(u8),

    #[error("invalid length or integer '{0}'")]
    InvalidNumber(String),

    #[error("reply line is not CRLF-terminated")]
    MissingTerminator,
}

/// Largest bulk string a server may send (the Redis `proto-max-bulk-len` default).
pub const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

/// Largest element count accepted for one array reply.
pub const MAX_ARRAY_LEN: i64 = 1024 * 1024;

type ReadFuture<'a> = Pin<Box<dyn Future<Output = Result<RespValue, RespError>> + Send + 'a>>;

/// Encode one command as a RESP array of bulk strings.
pub fn encode_command<A: AsRef<[u8]>>(args: &[A]) -> Vec<u8> {
    let size: usize = args.iter().map(|a| a.as_ref().len() + 16).sum();
    let mut out = Vec::with_capacity(size + 16);
    out.extend_from_slice(format!("*{}\r\n", args.len()).as_bytes());
    for arg in args {
        let arg = arg.as_ref();
        out.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        out.extend_from_slice(arg);
        out.extend_from_slice(b"\r\n");
    }
    out
}

/// Read one complete reply.
pub fn read_value<'a, R>(reader: &'a mut R) -> ReadFuture<'a>
where
    R: AsyncBufRead + Unpin + Send + 'a,
{
    Box::pin(async move {
        let line = read_line(&mut *reader).await?;
        let (prefix, rest) = match line.split_first() {
            Some((prefix, rest)) => (*prefix, rest),
            None => return Err(RespError::InvalidPrefix(b'\r')),
        };
        let text = String::from_utf8_lossy(rest).into_owned();

        match prefix {
            b'+' => Ok(RespValue::Simple(text)),
            b'-' => Ok(RespValue::Error(text)),
            b':' => Ok(RespValue::Integer(parse_number(&text)?)),
            b'$' => {
                let len = parse_length(&text, MAX_BULK_LEN)?;
                if len < 0 {
                    return Ok(RespValue::Bulk(None));
                }
                let mut data = vec![0u8; len as usize + 2];
                reader.read_exact(&mut data).await.map_err(eof_aware)?;
                if !data.ends_with(b"\r\n") {
                    return Err(RespError::MissingTerminator);
                }
                data.truncate(len as usize);
                Ok(RespValue::Bulk(Some(Bytes::from(data))))
            }
            b'*' => {
                let len = parse_length(&text, MAX_ARRAY_LEN)?;
                if len < 0 {
                    return Ok(RespValue::Array(None));
                }
                // Elements arrive one by one; the declared count is not trusted for allocation.
                let mut items = Vec::new();
                for _ in 0..len {
                    items.push(read_value(&mut *reader).await?);
                }
                Ok(RespValue::Array(Some(items)))
            }
            other => Err(RespError::InvalidPrefix(other)),
        }
    })
}

async fn read_line<R>(reader: &mut R) -> Result<Vec<u8>, RespError>
where
    R: AsyncBufRead + Unpin + Send,
{
    let mut line = Vec::new();
    let n = reader.read_until(b'\n', &mut line).await?;
    if n == 0 {
        return Err(RespError::Eof);
    }
    if !line.ends_with(b"\r\n") {
        return Err(RespError::MissingTerminator);
    }
    line.truncate(line.len() - 2);
    Ok(line)
}

fn parse_number(text: &str) -> Result<i64, RespError> {
    text.parse().map_err(|_| RespError::InvalidNumber(text.to_string()))
}

/// Parse a bulk or array length, rejecting anything above `max` or below -1.
fn parse_length(text: &str, max: i64) -> Result<i64, RespError> {
    match parse_number(text)? {
        len if (-1..=max).contains(&len) => Ok(len),
        _ => Err(RespError::InvalidNumber(text.to_string())),
    }
}

fn eof_aware(e: std::io::Error) -> RespError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        RespError::Eof
    } else {
        RespError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    async fn decode(bytes: &'static [u8]) -> Result<RespValue, RespError> {
        let mut reader = BufReader::new(bytes);
        read_value(&mut reader).await
    }

    #[test]
    fn encodes_bulk_array() {
        assert_eq!(
            encode_command(&["SET", "k", "v1"]),
            b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$2\r\nv1\r\n".to_vec()
        );
    }

    #[tokio::test]
    async fn decodes_scalar_replies() {
        assert_eq!(decode(b"+OK\r\n").await.unwrap(), RespValue::Simple("OK".into()));
        assert_eq!(decode(b"-ERR nope\r\n").await.unwrap(), RespValue::Error("ERR nope".into()));
        assert_eq!(decode(b":42\r\n").await.unwrap(), RespValue::Integer(42));
        assert_eq!(decode(b"$-1\r\n").await.unwrap(), RespValue::Bulk(None));
        assert_eq!(
            decode(b"$5\r\na\r\nbc\r\n").await.unwrap(),
            RespValue::Bulk(Some(Bytes::from_static(b"a\r\nbc")))
        );
    }

    #[tokio::test]
    async fn decodes_nested_arrays() {
        let value = decode(b"*2\r\n:1\r\n*1\r\n$1\r\nx\r\n").await.unwrap();
        assert_eq!(
            value,
            RespValue::Array(Some(vec![
                RespValue::Integer(1),
                RespValue::Array(Some(vec![RespValue::Bulk(Some(Bytes::from_static(b"x")))])),
            ]))
        );
    }

    #[tokio::test]
    async fn rejects_malformed_replies() {
        assert!(matches!(decode(b"").await, Err(RespError::Eof)));
        assert!(matches!(decode(b"?x\r\n").await, Err(RespError::InvalidPrefix(b'?'))));
        assert!(matches!(decode(b":abc\r\n").await, Err(RespError::InvalidNumber(_))));
        assert!(matches!(decode(b"$3\r\nab").await, Err(RespError::Eof)));
        assert!(matches!(decode(b"+OK\n").await, Err(RespError::MissingTerminator)));
        assert!(matches!(decode(b"$-2\r\n").await, Err(RespError::InvalidNumber(_))));
    }

    #[tokio::test]
    async fn rejects_oversized_lengths_before_allocating() {
        assert!(matches!(
            decode(b"$9223372036854775807\r\n").await,
            Err(RespError::InvalidNumber(_))
        ));
        assert!(matches!(decode(b"$536870913\r\n").await, Err(RespError::InvalidNumber(_))));
        assert!(matches!(
            decode(b"*9223372036854775807\r\n").await,
            Err(RespError::InvalidNumber(_))
        ));

        // A count within the limit but with missing elements fails on read, not on allocation.
        assert!(matches!(decode(b"*1048576\r\n:1\r\n").await, Err(RespError::Eof)));
    }
}
