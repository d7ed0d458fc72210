use std::collections::BTreeMap;
use std::io::{self, Write};

use byteorder::{ByteOrder, WriteBytesExt, LE};
use bytes::{BufMut, Bytes, BytesMut};
use integer_encoding::{VarInt, VarIntWriter};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::{
    err::{DecodeError, Result, SnapshotError},
    snapshot::{ModelEntry, Snapshot},
    util::masked_crc,
};

pub const SNAPSHOT_MAGIC: u32 = 0x534E_4150;
pub const HEADER_SIZE: usize = 4 + 2 + 4 + 4;

// magic u32
// format version u16
// body length u32
// body crc u32 (masked)
// -------------------
// name, created_at u64, sequence u64, model count
// model: name, version, worker_count u32, param count, (key, value)*
// strings and counts are varint prefixed

#[derive(IntoPrimitive, TryFromPrimitive, Eq, PartialEq, Debug, Clone, Copy)]
#[repr(u16)]
pub enum FormatVersion {
    V1 = 1,
}

impl FormatVersion {
    pub const CURRENT: FormatVersion = FormatVersion::V1;
}

/// Conversion between a [`Snapshot`] and its durable bytes.
pub trait SnapshotCodec: Send + Sync {
    fn encode(&self, snapshot: &Snapshot) -> Result<Bytes>;
    fn decode(&self, data: &[u8]) -> Result<Snapshot>;
}

/// Length prefixed little endian encoding with a crc guarded body.
///
/// Bytes beyond what the format version declares are rejected rather than
/// carried along, so a decoded value always re-encodes to the same bytes.
#[derive(Debug, Default, Clone, Copy)]
pub struct BinarySnapshotCodec;

impl SnapshotCodec for BinarySnapshotCodec {
    fn encode(&self, snapshot: &Snapshot) -> Result<Bytes> {
        if snapshot.name.is_empty() {
            return Err(SnapshotError::Encoding("empty snapshot name".into()));
        }
        if let Some(dup) = snapshot.find_duplicate() {
            return Err(SnapshotError::Encoding(format!(
                "duplicate model {}:{}",
                dup.model_name, dup.version
            )));
        }

        let mut body = BytesMut::with_capacity(64 + snapshot.models.len() * 48).writer();
        write_body(snapshot, &mut body).map_err(|e| SnapshotError::Encoding(e.to_string()))?;
        let body = body.into_inner().freeze();
        if body.len() > u32::MAX as usize {
            return Err(SnapshotError::Encoding(format!(
                "snapshot body too large, {} bytes",
                body.len()
            )));
        }

        let mut out = BytesMut::with_capacity(HEADER_SIZE + body.len()).writer();
        write_header(&body, &mut out).map_err(|e| SnapshotError::Encoding(e.to_string()))?;
        out.write_all(&body)
            .map_err(|e| SnapshotError::Encoding(e.to_string()))?;
        Ok(out.into_inner().freeze())
    }

    fn decode(&self, data: &[u8]) -> Result<Snapshot> {
        Ok(decode_snapshot(data)?)
    }
}

fn write_header<W: Write>(body: &[u8], w: &mut W) -> io::Result<()> {
    w.write_u32::<LE>(SNAPSHOT_MAGIC)?;
    w.write_u16::<LE>(FormatVersion::CURRENT.into())?;
    w.write_u32::<LE>(body.len() as u32)?;
    w.write_u32::<LE>(masked_crc(body))?;
    Ok(())
}

fn write_str<W: Write>(s: &str, w: &mut W) -> io::Result<()> {
    if s.len() > u32::MAX as usize {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("string of {} bytes too large", s.len()),
        ));
    }
    w.write_varint(s.len() as u64)?;
    w.write_all(s.as_bytes())
}

fn write_body<W: Write>(snapshot: &Snapshot, w: &mut W) -> io::Result<()> {
    write_str(&snapshot.name, w)?;
    w.write_u64::<LE>(snapshot.created_at)?;
    w.write_u64::<LE>(snapshot.sequence)?;
    w.write_varint(snapshot.models.len() as u64)?;
    for model in &snapshot.models {
        write_str(&model.model_name, w)?;
        write_str(&model.version, w)?;
        w.write_u32::<LE>(model.worker_count)?;
        w.write_varint(model.runtime_params.len() as u64)?;
        for (key, value) in &model.runtime_params {
            write_str(key, w)?;
            write_str(value, w)?;
        }
    }
    Ok(())
}

struct SliceReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> SliceReader<'a> {
    fn new(data: &'a [u8], offset: usize) -> Self {
        Self { data, offset }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    fn take(&mut self, n: usize) -> std::result::Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::Truncated {
                offset: self.offset,
                need: n - self.remaining(),
            });
        }
        let s = &self.data[self.offset..self.offset + n];
        self.offset += n;
        Ok(s)
    }

    fn u16(&mut self) -> std::result::Result<u16, DecodeError> {
        Ok(LE::read_u16(self.take(2)?))
    }

    fn u32(&mut self) -> std::result::Result<u32, DecodeError> {
        Ok(LE::read_u32(self.take(4)?))
    }

    fn u64(&mut self) -> std::result::Result<u64, DecodeError> {
        Ok(LE::read_u64(self.take(8)?))
    }

    fn varint(&mut self, field: &'static str) -> std::result::Result<u64, DecodeError> {
        let rest = &self.data[self.offset..];
        match u64::decode_var(rest) {
            Some((v, n)) => {
                self.offset += n;
                Ok(v)
            }
            // a u64 varint ends within 10 bytes
            None => match rest.iter().position(|b| b & 0x80 == 0) {
                None if rest.len() < 10 => Err(DecodeError::Truncated {
                    offset: self.offset,
                    need: 1,
                }),
                end => Err(DecodeError::InvalidLength {
                    field,
                    len: end.map_or(rest.len(), |e| e + 1) as u64,
                }),
            },
        }
    }

    fn length(&mut self, field: &'static str) -> std::result::Result<usize, DecodeError> {
        let len = self.varint(field)?;
        if len > u32::MAX as u64 {
            return Err(DecodeError::InvalidLength { field, len });
        }
        Ok(len as usize)
    }

    fn string(&mut self, field: &'static str) -> std::result::Result<String, DecodeError> {
        let len = self.length(field)?;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8(field))
    }
}

fn decode_snapshot(data: &[u8]) -> std::result::Result<Snapshot, DecodeError> {
    let mut r = SliceReader::new(data, 0);
    let magic = r.u32()?;
    if magic != SNAPSHOT_MAGIC {
        return Err(DecodeError::BadMagic(magic));
    }
    let version = r.u16()?;
    FormatVersion::try_from(version).map_err(|_| DecodeError::UnsupportedVersion(version))?;

    let body_len = r.u32()? as usize;
    let stored_crc = r.u32()?;
    if r.remaining() > body_len {
        return Err(DecodeError::TrailingBytes(r.remaining() - body_len));
    }
    let body = r.take(body_len)?;
    let computed = masked_crc(body);
    if computed != stored_crc {
        return Err(DecodeError::ChecksumMismatch {
            stored: stored_crc,
            computed,
        });
    }

    let mut r = SliceReader::new(body, 0);
    let name = r.string("name")?;
    if name.is_empty() {
        return Err(DecodeError::InvalidLength {
            field: "name",
            len: 0,
        });
    }
    let created_at = r.u64()?;
    let sequence = r.u64()?;
    let model_count = r.length("models")?;

    // every model takes at least 7 bytes, don't trust the count for capacity
    let mut models = Vec::with_capacity(model_count.min(r.remaining() / 7));
    for _ in 0..model_count {
        let model_name = r.string("model_name")?;
        let version = r.string("version")?;
        let worker_count = r.u32()?;
        let param_count = r.length("runtime_params")?;
        let mut runtime_params = BTreeMap::new();
        for _ in 0..param_count {
            let key = r.string("param_key")?;
            let value = r.string("param_value")?;
            runtime_params.insert(key, value);
        }
        if runtime_params.len() != param_count {
            return Err(DecodeError::InvalidLength {
                field: "runtime_params",
                len: param_count as u64,
            });
        }
        models.push(ModelEntry {
            model_name,
            version,
            worker_count,
            runtime_params,
        });
    }
    if r.remaining() > 0 {
        return Err(DecodeError::TrailingBytes(r.remaining()));
    }

    let snapshot = Snapshot {
        name,
        created_at,
        sequence,
        models,
    };
    if let Some(dup) = snapshot.find_duplicate() {
        return Err(DecodeError::DuplicateModel {
            model_name: dup.model_name.clone(),
            version: dup.version.clone(),
        });
    }
    Ok(snapshot)
}
