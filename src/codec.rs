use bytes::{Buf, Bytes, BytesMut};
use std::io;
use thiserror::Error as ThisError;
use tokio_util::codec::{Decoder, Encoder};

use crate::reply::{Reply, CRLF};
use crate::request::Request;

/// Upper bound for the number of elements of a multi-bulk request.
const MAX_MULTIBULK_LEN: i64 = 1024 * 1024;
/// Upper bound for a single bulk argument.
const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;
/// Upper bound for an inline request, or a header line, that has not been terminated yet.
const MAX_INLINE_LEN: usize = 64 * 1024;
const MAX_PREALLOCATED_ARGS: usize = 1024;

#[derive(Debug, ThisError)]
pub enum CodecError {
    /// The peer sent bytes that are not a valid request. The connection can not be resynchronized.
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl CodecError {
    fn protocol(msg: impl Into<String>) -> CodecError {
        CodecError::Protocol(msg.into())
    }
}

/// Decodes requests sent by clients and encodes the replies sent back to them.
///
/// Requests are either a multi-bulk array of bulk strings, or a single inline line of text split on
/// whitespace. A frame is only removed from the buffer once it has been fully received. The
/// arguments of a multi-bulk request that already arrived are kept between calls, so a frame
/// received in many reads is scanned once.
#[derive(Debug, Default)]
pub struct RespCodec {
    pending: Option<Multibulk>,
}

/// A multi-bulk request whose arguments are still arriving.
#[derive(Debug)]
struct Multibulk {
    count: usize,
    // Offset of the next argument header in the buffer.
    position: usize,
    parts: Vec<Bytes>,
}

impl RespCodec {
    pub fn new() -> RespCodec {
        RespCodec::default()
    }

    // *<number-of-arguments>\r\n$<argument-length>\r\n<argument>\r\n...
    fn parse_multibulk(&mut self, src: &[u8]) -> Result<Parsed, CodecError> {
        let mut pending = match self.pending.take() {
            Some(pending) => pending,
            None => match read_multibulk_header(src)? {
                Some(pending) => pending,
                None => return Ok(None),
            },
        };

        while pending.parts.len() < pending.count {
            match read_bulk(src, pending.position)? {
                Some((part, next)) => {
                    pending.parts.push(part);
                    pending.position = next;
                }
                None => {
                    self.pending = Some(pending);
                    return Ok(None);
                }
            }
        }

        Ok(Some((pending.position, pending.parts)))
    }
}

impl Decoder for RespCodec {
    type Item = Request;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if src.is_empty() {
                return Ok(None);
            }

            let parsed = if src[0] == b'*' {
                self.parse_multibulk(src)?
            } else {
                parse_inline(src)?
            };

            let (consumed, parts) = match parsed {
                Some(parsed) => parsed,
                // Not enough data to parse an entire frame.
                None => return Ok(None),
            };

            src.advance(consumed);

            let mut parts = parts.into_iter();
            let name = match parts.next() {
                Some(name) => name,
                // Blank inline lines are skipped.
                None => continue,
            };
            let name = String::from_utf8(name.to_vec())
                .map_err(|_| CodecError::protocol("invalid command name encoding"))?;

            return Ok(Some(Request::new(name, parts.collect())));
        }
    }
}

impl Encoder<Reply> for RespCodec {
    type Error = CodecError;

    fn encode(&mut self, reply: Reply, dst: &mut BytesMut) -> Result<(), Self::Error> {
        reply.write_to(dst);
        Ok(())
    }
}

type Parsed = Option<(usize, Vec<Bytes>)>;

fn read_multibulk_header(src: &[u8]) -> Result<Option<Multibulk>, CodecError> {
    let (header, position) = match read_line(src, 0, "too big mbulk count string")? {
        Some(line) => line,
        None => return Ok(None),
    };

    let count = parse_length(&header[1..])
        .filter(|count| (1..=MAX_MULTIBULK_LEN).contains(count))
        .ok_or_else(|| CodecError::protocol("invalid multibulk length"))? as usize;

    Ok(Some(Multibulk {
        count,
        position,
        // The count is only a claim until the arguments arrive.
        parts: Vec::with_capacity(count.min(MAX_PREALLOCATED_ARGS)),
    }))
}

/// Reads the bulk argument whose header starts at `position`. Returns the argument and the position
/// right after it.
fn read_bulk(src: &[u8], position: usize) -> Result<Option<(Bytes, usize)>, CodecError> {
    let (header, next) = match read_line(src, position, "too big bulk count string")? {
        Some(line) => line,
        None => return Ok(None),
    };

    match header.first() {
        Some(b'$') => {}
        Some(&byte) => {
            return Err(CodecError::protocol(format!(
                "expected '$', got '{}'",
                byte as char
            )))
        }
        None => return Err(CodecError::protocol("expected '$', got ''")),
    }

    let length = parse_length(&header[1..])
        .filter(|length| (0..=MAX_BULK_LEN).contains(length))
        .ok_or_else(|| CodecError::protocol("invalid bulk length"))? as usize;

    let end = next + length;
    if src.len() < end + CRLF.len() {
        return Ok(None);
    }
    if &src[end..end + CRLF.len()] != CRLF {
        return Err(CodecError::protocol("bulk argument not terminated by CRLF"));
    }

    Ok(Some((Bytes::copy_from_slice(&src[next..end]), end + CRLF.len())))
}

fn parse_inline(src: &[u8]) -> Result<Parsed, CodecError> {
    let end = match src.iter().position(|&b| b == b'\n') {
        Some(end) => end,
        None if src.len() > MAX_INLINE_LEN => {
            return Err(CodecError::protocol("too big inline request"))
        }
        None => return Ok(None),
    };

    let parts = src[..end]
        .split(|b| b.is_ascii_whitespace())
        .filter(|part| !part.is_empty())
        .map(Bytes::copy_from_slice)
        .collect();

    Ok(Some((end + 1, parts)))
}

/// Returns the line starting at `start` without its CRLF, and the position right after it.
fn read_line<'a>(
    src: &'a [u8],
    start: usize,
    too_big: &str,
) -> Result<Option<(&'a [u8], usize)>, CodecError> {
    match src[start..].windows(2).position(|window| window == CRLF) {
        Some(index) => Ok(Some((&src[start..start + index], start + index + CRLF.len()))),
        None if src.len() - start > MAX_INLINE_LEN => Err(CodecError::protocol(too_big)),
        None => Ok(None),
    }
}

fn parse_length(digits: &[u8]) -> Option<i64> {
    std::str::from_utf8(digits).ok()?.parse::<i64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(data: &[u8]) -> (Result<Option<Request>, CodecError>, BytesMut) {
        let mut buf = BytesMut::from(data);
        let result = RespCodec::new().decode(&mut buf);
        (result, buf)
    }

    fn args(request: &Request) -> Vec<&[u8]> {
        request.args().iter().map(|arg| &arg[..]).collect()
    }

    #[test]
    fn decode_multibulk_request() {
        let (result, rest) = decode(b"*3\r\n$3\r\nSET\r\n$5\r\nmykey\r\n$7\r\nmyvalue\r\n");
        let request = result.unwrap().unwrap();

        assert_eq!(request.name(), "SET");
        assert_eq!(args(&request), vec![&b"mykey"[..], &b"myvalue"[..]]);
        assert!(rest.is_empty());
    }

    #[test]
    fn decode_binary_argument() {
        let (result, _) = decode(b"*2\r\n$4\r\nECHO\r\n$4\r\na\r\nb\r\n");
        let request = result.unwrap().unwrap();

        assert_eq!(args(&request), vec![&b"a\r\nb"[..]]);
    }

    #[test]
    fn decode_empty_argument() {
        let (result, _) = decode(b"*2\r\n$4\r\nECHO\r\n$0\r\n\r\n");
        let request = result.unwrap().unwrap();

        assert_eq!(args(&request), vec![&b""[..]]);
    }

    #[test]
    fn decode_leaves_next_request_in_buffer() {
        let (result, rest) = decode(b"*1\r\n$4\r\nPING\r\n*1\r\n$4\r\nPI");

        assert_eq!(result.unwrap().unwrap().name(), "PING");
        assert_eq!(&rest[..], b"*1\r\n$4\r\nPI");
    }

    #[test]
    fn decode_incomplete_keeps_buffer() {
        for partial in [
            &b"*2\r\n"[..],
            &b"*2\r\n$3\r\nGET\r\n"[..],
            &b"*2\r\n$3\r\nGET\r\n$3\r\nfo"[..],
            &b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r"[..],
            &b"*2"[..],
        ] {
            let (result, rest) = decode(partial);

            assert!(matches!(result, Ok(None)), "{:?}", partial);
            assert_eq!(&rest[..], partial);
        }
    }

    #[test]
    fn decode_resumes_a_partial_multibulk() {
        let mut codec = RespCodec::new();
        let mut buf = BytesMut::from(&b"*2\r\n$3\r\nGET\r\n$3\r\nfo"[..]);

        assert!(matches!(codec.decode(&mut buf), Ok(None)));
        let pending = codec.pending.as_ref().unwrap();
        assert_eq!(pending.parts, vec![Bytes::from("GET")]);
        assert_eq!(pending.position, 13);

        buf.extend_from_slice(b"o\r\n");
        let request = codec.decode(&mut buf).unwrap().unwrap();

        assert_eq!(request.name(), "GET");
        assert_eq!(args(&request), vec![&b"foo"[..]]);
        assert!(buf.is_empty());
        assert!(codec.pending.is_none());
    }

    #[test]
    fn decode_large_request_in_small_reads() {
        let mut frame = BytesMut::new();
        Reply::Array(
            (0..200)
                .map(|i| Reply::Bulk(Bytes::from(format!("argument-{}", i))))
                .collect(),
        )
        .write_to(&mut frame);

        let (whole, _) = decode(&frame);
        let whole = whole.unwrap().unwrap();

        let mut codec = RespCodec::new();
        let mut buf = BytesMut::new();
        let mut decoded = None;
        for chunk in frame.chunks(7) {
            assert!(decoded.is_none());
            buf.extend_from_slice(chunk);
            decoded = codec.decode(&mut buf).unwrap();
        }

        let request = decoded.unwrap();
        assert_eq!(request.name(), whole.name());
        assert_eq!(request.args(), whole.args());
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_does_not_trust_the_multibulk_count() {
        let mut codec = RespCodec::new();
        let mut buf = BytesMut::from(&b"*1048576\r\n$3\r\nGET\r\n"[..]);

        assert!(matches!(codec.decode(&mut buf), Ok(None)));
        let pending = codec.pending.as_ref().unwrap();
        assert_eq!(pending.count, 1048576);
        assert!(pending.parts.capacity() <= MAX_PREALLOCATED_ARGS);
    }

    #[test]
    fn decode_error_drops_partial_progress() {
        let mut codec = RespCodec::new();
        let mut buf = BytesMut::from(&b"*2\r\n$3\r\nGET\r\n"[..]);
        assert!(matches!(codec.decode(&mut buf), Ok(None)));

        buf.extend_from_slice(b":3\r\n");
        assert!(matches!(codec.decode(&mut buf), Err(CodecError::Protocol(_))));
        assert!(codec.pending.is_none());
    }

    #[test]
    fn decode_inline_request() {
        let (result, rest) = decode(b"set  foo   bar\r\n");
        let request = result.unwrap().unwrap();

        assert_eq!(request.name(), "set");
        assert_eq!(args(&request), vec![&b"foo"[..], &b"bar"[..]]);
        assert!(rest.is_empty());
    }

    #[test]
    fn decode_inline_request_with_bare_newline() {
        let (result, _) = decode(b"PING\n");

        assert_eq!(result.unwrap().unwrap().name(), "PING");
    }

    #[test]
    fn decode_skips_blank_lines() {
        let (result, rest) = decode(b"\r\n  \r\nPING\r\n");

        assert_eq!(result.unwrap().unwrap().name(), "PING");
        assert!(rest.is_empty());
    }

    #[test]
    fn decode_only_blank_lines() {
        let (result, rest) = decode(b"\r\n\r\n");

        assert!(matches!(result, Ok(None)));
        assert!(rest.is_empty());
    }

    #[test]
    fn decode_non_numeric_multibulk_length() {
        let (result, _) = decode(b"*InvalidRequest\r\n\r\n\r\n");

        assert!(matches!(
            result,
            Err(CodecError::Protocol(ref msg)) if msg == "invalid multibulk length"
        ));
    }

    #[test]
    fn decode_negative_and_zero_multibulk_length() {
        for data in [&b"*-1\r\n"[..], &b"*0\r\n"[..]] {
            let (result, _) = decode(data);
            assert!(matches!(result, Err(CodecError::Protocol(_))));
        }
    }

    #[test]
    fn decode_negative_bulk_length() {
        let (result, _) = decode(b"*1\r\n$-1\r\n");

        assert!(matches!(
            result,
            Err(CodecError::Protocol(ref msg)) if msg == "invalid bulk length"
        ));
    }

    #[test]
    fn decode_missing_bulk_marker() {
        let (result, _) = decode(b"*1\r\n:3\r\n");

        assert!(matches!(
            result,
            Err(CodecError::Protocol(ref msg)) if msg == "expected '$', got ':'"
        ));
    }

    #[test]
    fn decode_bulk_without_crlf() {
        let (result, _) = decode(b"*1\r\n$3\r\nfooXY");

        assert!(matches!(result, Err(CodecError::Protocol(_))));
    }

    #[test]
    fn decode_too_big_inline_request() {
        let data = vec![b'a'; MAX_INLINE_LEN + 1];
        let (result, _) = decode(&data);

        assert!(matches!(
            result,
            Err(CodecError::Protocol(ref msg)) if msg == "too big inline request"
        ));
    }

    #[test]
    fn protocol_error_message() {
        let err = CodecError::protocol("invalid bulk length");

        assert_eq!(err.to_string(), "Protocol error: invalid bulk length");
    }

    #[test]
    fn encode_reply() {
        let mut dst = BytesMut::new();
        RespCodec::new()
            .encode(Reply::Array(vec![Reply::bulk("a"), Reply::Nil]), &mut dst)
            .unwrap();

        assert_eq!(&dst[..], b"*2\r\n$1\r\na\r\n$-1\r\n");
    }
}
