// https://redis.io/docs/reference/protocol-spec

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io::Cursor;
use thiserror::Error as ThisError;

pub(crate) static CRLF: &[u8; 2] = b"\r\n";

#[derive(Debug, ThisError, PartialEq)]
pub enum ParseError {
    #[error("not enough data is available to parse an entire reply")]
    Incomplete,
    #[error("invalid reply data type: {0}")]
    InvalidDataType(u8),
    #[error("invalid reply format; {0}")]
    Invalid(String),
}

/// One response as it travels on the wire.
///
/// Every value of this type can be encoded; status and error text is written on a single line, so
/// any CR or LF inside it is replaced by a space.
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    Status(String),
    Error(String),
    Integer(i64),
    Bulk(Bytes),
    Nil,
    Array(Vec<Reply>),
}

impl Reply {
    pub fn ok() -> Reply {
        Reply::Status("OK".to_string())
    }

    pub fn status(s: impl Into<String>) -> Reply {
        Reply::Status(s.into())
    }

    pub fn error(s: impl Into<String>) -> Reply {
        Reply::Error(s.into())
    }

    pub fn bulk(b: impl Into<Bytes>) -> Reply {
        Reply::Bulk(b.into())
    }

    /// Appends the wire representation of the reply to `dst`.
    pub fn write_to(&self, dst: &mut BytesMut) {
        match self {
            Reply::Status(s) => write_line(dst, DataType::SimpleString, s),
            Reply::Error(s) => write_line(dst, DataType::SimpleError, s),
            Reply::Integer(i) => {
                dst.put_u8(u8::from(DataType::Integer));
                dst.extend_from_slice(i.to_string().as_bytes());
                dst.extend_from_slice(CRLF);
            }
            // $<length>\r\n<data>\r\n
            Reply::Bulk(bytes) => {
                dst.reserve(1 + 20 + CRLF.len() + bytes.len() + CRLF.len());
                dst.put_u8(u8::from(DataType::BulkString));
                dst.extend_from_slice(bytes.len().to_string().as_bytes());
                dst.extend_from_slice(CRLF);
                dst.extend_from_slice(bytes);
                dst.extend_from_slice(CRLF);
            }
            // RESP2 has no null type of its own, the missing value is a bulk string of length -1.
            Reply::Nil => dst.extend_from_slice(b"$-1\r\n"),
            // *<number-of-elements>\r\n<element-1>...<element-n>
            Reply::Array(replies) => {
                dst.put_u8(u8::from(DataType::Array));
                dst.extend_from_slice(replies.len().to_string().as_bytes());
                dst.extend_from_slice(CRLF);
                for reply in replies {
                    reply.write_to(dst);
                }
            }
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut dst = BytesMut::new();
        self.write_to(&mut dst);
        dst.to_vec()
    }

    /// Parses a single reply from `src`, advancing the cursor past it.
    pub fn parse(src: &mut Cursor<&[u8]>) -> Result<Reply, ParseError> {
        // The first byte in an RESP-serialized payload always identifies its type.
        let first_byte = get_byte(src)?;
        let data_type = DataType::try_from(first_byte)?;

        match data_type {
            DataType::SimpleString => {
                let line = get_line(src)?;
                Ok(Reply::Status(utf8(line)?))
            }
            DataType::SimpleError => {
                let line = get_line(src)?;
                Ok(Reply::Error(utf8(line)?))
            }
            DataType::Integer => {
                let line = get_line(src)?;
                Ok(Reply::Integer(integer(line)?))
            }
            DataType::BulkString => {
                let length = integer(get_line(src)?)?;
                if length == -1 {
                    return Ok(Reply::Nil);
                }
                let length = usize::try_from(length)
                    .map_err(|_| ParseError::Invalid(format!("bulk length {}", length)))?;

                let data = get_exact(src, length)?;
                Ok(Reply::Bulk(Bytes::copy_from_slice(data)))
            }
            DataType::Array => {
                let length = integer(get_line(src)?)?;
                if length == -1 {
                    return Ok(Reply::Nil);
                }
                let length = usize::try_from(length)
                    .map_err(|_| ParseError::Invalid(format!("array length {}", length)))?;

                let mut replies = Vec::with_capacity(length.min(1024));
                for _ in 0..length {
                    replies.push(Self::parse(src)?);
                }
                Ok(Reply::Array(replies))
            }
        }
    }
}

impl From<Reply> for Vec<u8> {
    fn from(reply: Reply) -> Self {
        reply.serialize()
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Status(s) => write!(f, "+{}", s),
            Reply::Error(s) => write!(f, "-{}", s),
            Reply::Integer(i) => write!(f, ":{}", i),
            Reply::Bulk(bytes) => write!(f, "${}", String::from_utf8_lossy(bytes)),
            Reply::Nil => write!(f, "$-1"),
            Reply::Array(replies) => {
                write!(f, "*{}", replies.len())?;
                for reply in replies {
                    write!(f, " {}", reply)?;
                }
                Ok(())
            }
        }
    }
}

fn write_line(dst: &mut BytesMut, data_type: DataType, line: &str) {
    dst.reserve(1 + line.len() + CRLF.len());
    dst.put_u8(u8::from(data_type));
    dst.extend(
        line.bytes()
            .map(|b| if b == b'\r' || b == b'\n' { b' ' } else { b }),
    );
    dst.extend_from_slice(CRLF);
}

fn get_line<'a>(src: &mut Cursor<&'a [u8]>) -> Result<&'a [u8], ParseError> {
    let start = src.position() as usize;
    let buf: &'a [u8] = *src.get_ref();

    let end = buf[start..]
        .windows(2)
        .position(|window| window == CRLF)
        .map(|index| start + index)
        .ok_or(ParseError::Incomplete)?;

    src.set_position((end + CRLF.len()) as u64);

    Ok(&buf[start..end])
}

fn get_exact<'a>(src: &mut Cursor<&'a [u8]>, length: usize) -> Result<&'a [u8], ParseError> {
    let start = src.position() as usize;
    let buf: &'a [u8] = *src.get_ref();

    if buf.len() < start + length + CRLF.len() {
        return Err(ParseError::Incomplete);
    }
    if &buf[start + length..start + length + CRLF.len()] != CRLF {
        return Err(ParseError::Invalid("bulk data not terminated by CRLF".to_string()));
    }

    src.set_position((start + length + CRLF.len()) as u64);

    Ok(&buf[start..start + length])
}

fn get_byte(src: &mut Cursor<&[u8]>) -> Result<u8, ParseError> {
    if !src.has_remaining() {
        return Err(ParseError::Incomplete);
    }
    Ok(src.get_u8())
}

fn utf8(bytes: &[u8]) -> Result<String, ParseError> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| ParseError::Invalid("invalid UTF-8 string".to_string()))
}

fn integer(bytes: &[u8]) -> Result<i64, ParseError> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| {
            ParseError::Invalid(format!("invalid integer {:?}", String::from_utf8_lossy(bytes)))
        })
}

#[derive(Debug)]
enum DataType {
    SimpleString, // '+'
    SimpleError,  // '-'
    Integer,      // ':'
    BulkString,   // '$'
    Array,        // '*'
}

impl TryFrom<u8> for DataType {
    type Error = ParseError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            b'+' => Ok(Self::SimpleString),
            b'-' => Ok(Self::SimpleError),
            b':' => Ok(Self::Integer),
            b'$' => Ok(Self::BulkString),
            b'*' => Ok(Self::Array),
            _ => Err(ParseError::InvalidDataType(byte)),
        }
    }
}

impl From<DataType> for u8 {
    fn from(value: DataType) -> Self {
        match value {
            DataType::SimpleString => b'+',
            DataType::SimpleError => b'-',
            DataType::Integer => b':',
            DataType::BulkString => b'$',
            DataType::Array => b'*',
        }
    }
}
