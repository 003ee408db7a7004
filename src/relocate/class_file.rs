//! Class file constant pool rewriting
//!
//! Every class, field and method name, descriptor and string literal of a
//! class file lives in a `CONSTANT_Utf8` entry of its constant pool. Only
//! those entries are rewritten; everything after the pool is copied as is.

use crate::relocate::remap::Remapper;

const MAGIC: u32 = 0xCAFE_BABE;

const TAG_UTF8: u8 = 1;
const TAG_INTEGER: u8 = 3;
const TAG_FLOAT: u8 = 4;
const TAG_LONG: u8 = 5;
const TAG_DOUBLE: u8 = 6;
const TAG_CLASS: u8 = 7;
const TAG_STRING: u8 = 8;
const TAG_FIELDREF: u8 = 9;
const TAG_METHODREF: u8 = 10;
const TAG_INTERFACE_METHODREF: u8 = 11;
const TAG_NAME_AND_TYPE: u8 = 12;
const TAG_METHOD_HANDLE: u8 = 15;
const TAG_METHOD_TYPE: u8 = 16;
const TAG_DYNAMIC: u8 = 17;
const TAG_INVOKE_DYNAMIC: u8 = 18;
const TAG_MODULE: u8 = 19;
const TAG_PACKAGE: u8 = 20;

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], String> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| format!("truncated at byte {}", self.pos))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, String> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, String> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, String> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}

/// Rewrite the constant pool of a class file.
///
/// Returns the input unchanged (as a copy) when no constant matched.
pub fn relocate_class(data: &[u8], remapper: &Remapper) -> Result<Vec<u8>, String> {
    let mut reader = Reader { data, pos: 0 };

    if reader.u32()? != MAGIC {
        return Err("not a class file (bad magic)".to_string());
    }
    let _minor = reader.u16()?;
    let _major = reader.u16()?;
    let count = reader.u16()?;

    let mut out = Vec::with_capacity(data.len() + 64);
    out.extend_from_slice(&data[..reader.pos]);

    let mut index = 1u16;
    while index < count {
        let start = reader.pos;
        let tag = reader.u8()?;
        match tag {
            TAG_UTF8 => {
                let len = reader.u16()? as usize;
                let bytes = reader.take(len)?;
                match remapper.map_bytes(bytes) {
                    Some(mapped) => {
                        let mapped_len = u16::try_from(mapped.len()).map_err(|_| {
                            format!("constant #{} exceeds 65535 bytes after relocation", index)
                        })?;
                        out.push(TAG_UTF8);
                        out.extend_from_slice(&mapped_len.to_be_bytes());
                        out.extend_from_slice(&mapped);
                    }
                    None => out.extend_from_slice(&data[start..reader.pos]),
                }
            }
            TAG_INTEGER | TAG_FLOAT => {
                reader.take(4)?;
                out.extend_from_slice(&data[start..reader.pos]);
            }
            TAG_LONG | TAG_DOUBLE => {
                reader.take(8)?;
                out.extend_from_slice(&data[start..reader.pos]);
                // Eight-byte constants take two pool slots
                index += 1;
            }
            TAG_CLASS | TAG_STRING | TAG_METHOD_TYPE | TAG_MODULE | TAG_PACKAGE => {
                reader.take(2)?;
                out.extend_from_slice(&data[start..reader.pos]);
            }
            TAG_FIELDREF
            | TAG_METHODREF
            | TAG_INTERFACE_METHODREF
            | TAG_NAME_AND_TYPE
            | TAG_DYNAMIC
            | TAG_INVOKE_DYNAMIC => {
                reader.take(4)?;
                out.extend_from_slice(&data[start..reader.pos]);
            }
            TAG_METHOD_HANDLE => {
                reader.take(3)?;
                out.extend_from_slice(&data[start..reader.pos]);
            }
            other => {
                return Err(format!(
                    "unknown constant pool tag {} at entry #{}",
                    other, index
                ))
            }
        }
        index += 1;
    }

    out.extend_from_slice(&data[reader.pos..]);
    Ok(out)
}
