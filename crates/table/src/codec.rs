//! The memcomparable datum encoding.
//!
//! Two encodings are provided. Both flatten strings to bytes and timestamps to ints:
//! - the key encoding, where the byte-wise order of encodings
//!   matches the order of the encoded values within one type,
//! - the value encoding, which is compact and only needs to be decodable.
//!
//! Both prefix each datum with a flag byte, so sequences of datums can be decoded back.

use crate::datum::Datum;
use crate::error::CodecError;

pub type Result<T> = core::result::Result<T, CodecError>;

pub(crate) const NIL_FLAG: u8 = 0;
pub(crate) const BYTES_FLAG: u8 = 1;
pub(crate) const COMPACT_BYTES_FLAG: u8 = 2;
pub(crate) const INT_FLAG: u8 = 3;
pub(crate) const UINT_FLAG: u8 = 4;
pub(crate) const FLOAT_FLAG: u8 = 5;
pub(crate) const VARINT_FLAG: u8 = 8;
pub(crate) const UVARINT_FLAG: u8 = 9;

const SIGN_MASK: u64 = 0x8000_0000_0000_0000;

const ENC_GROUP_SIZE: usize = 8;
const ENC_MARKER: u8 = 0xff;
const ENC_PAD: u8 = 0x0;

/// Appends the comparable encoding of `values` to `buf`.
pub fn encode_key(buf: &mut Vec<u8>, values: &[Datum]) {
    for v in values {
        match v {
            Datum::Null => buf.push(NIL_FLAG),
            Datum::Int(i) => {
                buf.push(INT_FLAG);
                encode_int(buf, *i);
            }
            Datum::Time(t) => {
                buf.push(INT_FLAG);
                encode_int(buf, t.0);
            }
            Datum::Uint(u) => {
                buf.push(UINT_FLAG);
                encode_uint(buf, *u);
            }
            Datum::Float(f) => {
                buf.push(FLOAT_FLAG);
                encode_float(buf, *f);
            }
            Datum::String(s) => {
                buf.push(BYTES_FLAG);
                encode_bytes(buf, s.as_bytes());
            }
            Datum::Bytes(b) => {
                buf.push(BYTES_FLAG);
                encode_bytes(buf, b);
            }
        }
    }
}

/// Appends the compact encoding of `values` to `buf`.
pub fn encode_value(buf: &mut Vec<u8>, values: &[Datum]) {
    for v in values {
        match v {
            Datum::Null => buf.push(NIL_FLAG),
            Datum::Int(i) => {
                buf.push(VARINT_FLAG);
                encode_varint(buf, *i);
            }
            Datum::Time(t) => {
                buf.push(VARINT_FLAG);
                encode_varint(buf, t.0);
            }
            Datum::Uint(u) => {
                buf.push(UVARINT_FLAG);
                encode_uvarint(buf, *u);
            }
            Datum::Float(f) => {
                buf.push(FLOAT_FLAG);
                encode_float(buf, *f);
            }
            Datum::String(s) => {
                buf.push(COMPACT_BYTES_FLAG);
                encode_compact_bytes(buf, s.as_bytes());
            }
            Datum::Bytes(b) => {
                buf.push(COMPACT_BYTES_FLAG);
                encode_compact_bytes(buf, b);
            }
        }
    }
}

/// Decodes every datum in `data`, in either encoding.
pub fn decode(mut data: &[u8]) -> Result<Vec<Datum>> {
    let mut values = Vec::new();
    while !data.is_empty() {
        values.push(decode_one(&mut data)?);
    }
    Ok(values)
}

/// Decodes the first datum of `data` and advances past it.
pub fn decode_one(data: &mut &[u8]) -> Result<Datum> {
    let flag = take(data, 1)?[0];
    Ok(match flag {
        NIL_FLAG => Datum::Null,
        INT_FLAG => Datum::Int(decode_int(data)?),
        UINT_FLAG => Datum::Uint(decode_uint(data)?),
        FLOAT_FLAG => Datum::Float(decode_float(data)?),
        BYTES_FLAG => Datum::Bytes(decode_bytes(data)?),
        COMPACT_BYTES_FLAG => Datum::Bytes(decode_compact_bytes(data)?),
        VARINT_FLAG => Datum::Int(decode_varint(data)?),
        UVARINT_FLAG => Datum::Uint(decode_uvarint(data)?),
        flag => return Err(CodecError::InvalidFlag(flag)),
    })
}

fn take<'a>(data: &mut &'a [u8], n: usize) -> Result<&'a [u8]> {
    if data.len() < n {
        return Err(CodecError::Insufficient {
            need: n,
            left: data.len(),
        });
    }
    let (head, tail) = data.split_at(n);
    *data = tail;
    Ok(head)
}

fn take_array<const N: usize>(data: &mut &[u8]) -> Result<[u8; N]> {
    let mut arr = [0; N];
    arr.copy_from_slice(take(data, N)?);
    Ok(arr)
}

/// Appends `v` so that signed order equals byte-wise order.
pub fn encode_int(buf: &mut Vec<u8>, v: i64) {
    encode_uint(buf, v as u64 ^ SIGN_MASK);
}

pub fn decode_int(data: &mut &[u8]) -> Result<i64> {
    Ok((decode_uint(data)? ^ SIGN_MASK) as i64)
}

pub fn encode_uint(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_be_bytes());
}

pub fn decode_uint(data: &mut &[u8]) -> Result<u64> {
    take_array(data).map(u64::from_be_bytes)
}

fn encode_float(buf: &mut Vec<u8>, f: f64) {
    let mut u = f.to_bits();
    if f >= 0.0 {
        u |= SIGN_MASK;
    } else {
        u = !u;
    }
    encode_uint(buf, u);
}

fn decode_float(data: &mut &[u8]) -> Result<f64> {
    let mut u = decode_uint(data)?;
    if u & SIGN_MASK > 0 {
        u &= !SIGN_MASK;
    } else {
        u = !u;
    }
    Ok(f64::from_bits(u))
}

/// Appends `data` in groups of 8 bytes, each followed by a marker
/// telling how many bytes of the group are padding.
/// Shorter strings sort first since padding is zero and the marker of a short group is smaller.
fn encode_bytes(buf: &mut Vec<u8>, data: &[u8]) {
    buf.reserve((data.len() / ENC_GROUP_SIZE + 1) * (ENC_GROUP_SIZE + 1));
    let mut chunks = data.chunks_exact(ENC_GROUP_SIZE);
    for chunk in &mut chunks {
        buf.extend_from_slice(chunk);
        buf.push(ENC_MARKER);
    }
    let rem = chunks.remainder();
    let pad = ENC_GROUP_SIZE - rem.len();
    buf.extend_from_slice(rem);
    buf.extend(std::iter::repeat_n(ENC_PAD, pad));
    buf.push(ENC_MARKER - pad as u8);
}

fn decode_bytes(data: &mut &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    loop {
        let group = take(data, ENC_GROUP_SIZE + 1)?;
        let marker = group[ENC_GROUP_SIZE];
        let pad = (ENC_MARKER - marker) as usize;
        if pad > ENC_GROUP_SIZE {
            return Err(CodecError::InvalidMarker(marker));
        }
        let real = ENC_GROUP_SIZE - pad;
        out.extend_from_slice(&group[..real]);
        if pad != 0 {
            if group[real..ENC_GROUP_SIZE].iter().any(|b| *b != ENC_PAD) {
                return Err(CodecError::InvalidMarker(marker));
            }
            return Ok(out);
        }
    }
}

fn encode_compact_bytes(buf: &mut Vec<u8>, data: &[u8]) {
    encode_varint(buf, data.len() as i64);
    buf.extend_from_slice(data);
}

fn decode_compact_bytes(data: &mut &[u8]) -> Result<Vec<u8>> {
    let len = decode_varint(data)?;
    let len = usize::try_from(len).map_err(|_| CodecError::VarintOverflow)?;
    take(data, len).map(<[u8]>::to_vec)
}

/// Zig-zag, then LEB128.
fn encode_varint(buf: &mut Vec<u8>, v: i64) {
    let mut ux = (v as u64) << 1;
    if v < 0 {
        ux = !ux;
    }
    encode_uvarint(buf, ux);
}

fn decode_varint(data: &mut &[u8]) -> Result<i64> {
    let ux = decode_uvarint(data)?;
    let x = (ux >> 1) as i64;
    Ok(if ux & 1 != 0 { !x } else { x })
}

fn encode_uvarint(buf: &mut Vec<u8>, mut v: u64) {
    while v >= 0x80 {
        buf.push(v as u8 | 0x80);
        v >>= 7;
    }
    buf.push(v as u8);
}

fn decode_uvarint(data: &mut &[u8]) -> Result<u64> {
    let mut x = 0u64;
    let mut shift = 0;
    for (i, &b) in data.iter().enumerate() {
        if shift == 63 && b > 1 {
            return Err(CodecError::VarintOverflow);
        }
        if b < 0x80 {
            *data = &data[i + 1..];
            return Ok(x | u64::from(b) << shift);
        }
        x |= u64::from(b & 0x7f) << shift;
        shift += 7;
        if shift > 63 {
            return Err(CodecError::VarintOverflow);
        }
    }
    Err(CodecError::Insufficient {
        need: 1,
        left: 0,
    })
}
