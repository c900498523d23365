//! Binary module format.
//!
//! ```text
//! [magic:u32][major:u8][minor:u8][count:u32] module*
//! module    := path consts named_funcs anon_funcs text
//! ```
//! All integers are little endian; strings and byte blobs are u32-length
//! prefixed.

use std::fs;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::rc::Rc;

use crate::error::ProtoError;

use super::proto::{
    AnonymousFuncProto, Constant, FuncProto, FunctionInfo, Parameter, Proto, UpvaluePtr,
};

pub const MAGIC: u32 = 0x0068_6a6c;
pub const VERSION_MAJOR: u8 = 0;
pub const VERSION_MINOR: u8 = 1;

const TAG_STRING: u8 = 0;
const TAG_INT: u8 = 1;
const TAG_FLOAT: u8 = 2;
const TAG_TRUE: u8 = 3;
const TAG_FALSE: u8 = 4;
const TAG_NIL: u8 = 5;

/// Whether the file starts with the proto magic number.
pub fn is_proto_file(path: &Path) -> bool {
    let Ok(mut file) = fs::File::open(path) else {
        return false;
    };
    let mut magic = [0u8; 4];
    file.read_exact(&mut magic).is_ok() && u32::from_le_bytes(magic) == MAGIC
}

pub fn save(path: &Path, protos: &[Proto]) -> Result<(), ProtoError> {
    let mut writer = BufWriter::new(fs::File::create(path)?);
    write_protos(&mut writer, protos)?;
    writer.flush()?;
    Ok(())
}

pub fn load(path: &Path) -> Result<Vec<Proto>, ProtoError> {
    let mut reader = BufReader::new(fs::File::open(path)?);
    read_protos(&mut reader)
}

pub fn write_protos<W: Write>(writer: W, protos: &[Proto]) -> Result<(), ProtoError> {
    let mut enc = Encoder { writer };
    enc.u32(MAGIC)?;
    enc.u8(VERSION_MAJOR)?;
    enc.u8(VERSION_MINOR)?;
    enc.u32(protos.len() as u32)?;
    for proto in protos {
        enc.proto(proto)?;
    }
    Ok(())
}

pub fn read_protos<R: Read>(reader: R) -> Result<Vec<Proto>, ProtoError> {
    let mut dec = Decoder { reader };
    let magic = dec.u32()?;
    if magic != MAGIC {
        return Err(ProtoError::InvalidMagic(magic));
    }
    let (major, minor) = (dec.u8()?, dec.u8()?);
    if major != VERSION_MAJOR {
        return Err(ProtoError::UnsupportedVersion(major, minor));
    }
    let count = dec.u32()?;
    (0..count).map(|_| dec.proto()).collect()
}

struct Encoder<W> {
    writer: W,
}

impl<W: Write> Encoder<W> {
    fn u8(&mut self, v: u8) -> Result<(), ProtoError> {
        self.writer.write_all(&[v])?;
        Ok(())
    }

    fn u32(&mut self, v: u32) -> Result<(), ProtoError> {
        self.writer.write_all(&v.to_le_bytes())?;
        Ok(())
    }

    fn bytes(&mut self, v: &[u8]) -> Result<(), ProtoError> {
        self.u32(v.len() as u32)?;
        self.writer.write_all(v)?;
        Ok(())
    }

    fn string(&mut self, v: &str) -> Result<(), ProtoError> {
        self.bytes(v.as_bytes())
    }

    fn constant(&mut self, c: &Constant) -> Result<(), ProtoError> {
        match c {
            Constant::String(s) => {
                self.u8(TAG_STRING)?;
                self.string(s)
            }
            Constant::Int(n) => {
                self.u8(TAG_INT)?;
                self.writer.write_all(&n.to_le_bytes())?;
                Ok(())
            }
            Constant::Float(n) => {
                self.u8(TAG_FLOAT)?;
                self.writer.write_all(&n.to_bits().to_le_bytes())?;
                Ok(())
            }
            Constant::Bool(true) => self.u8(TAG_TRUE),
            Constant::Bool(false) => self.u8(TAG_FALSE),
            Constant::Nil => self.u8(TAG_NIL),
        }
    }

    fn info(&mut self, info: &FunctionInfo) -> Result<(), ProtoError> {
        self.u8(info.variadic as u8)?;
        self.u32(info.params.len() as u32)?;
        for param in &info.params {
            self.string(&param.name)?;
            self.constant(&param.default)?;
        }
        self.bytes(&info.text)
    }

    fn proto(&mut self, proto: &Proto) -> Result<(), ProtoError> {
        self.string(&proto.file_path)?;

        self.u32(proto.consts.len() as u32)?;
        for c in &proto.consts {
            self.constant(c)?;
        }

        self.u32(proto.funcs.len() as u32)?;
        for func in &proto.funcs {
            self.string(&func.name)?;
            self.u32(func.upvalues.len() as u32)?;
            for slot in &func.upvalues {
                self.u32(*slot)?;
            }
            self.info(&func.info)?;
        }

        self.u32(proto.anonymous_funcs.len() as u32)?;
        for func in &proto.anonymous_funcs {
            self.u32(func.upvalues.len() as u32)?;
            for ptr in &func.upvalues {
                self.u8(ptr.direct as u8)?;
                self.u32(ptr.index)?;
            }
            self.info(&func.info)?;
        }

        self.bytes(&proto.text)
    }
}

struct Decoder<R> {
    reader: R,
}

impl<R: Read> Decoder<R> {
    fn u8(&mut self) -> Result<u8, ProtoError> {
        let mut buf = [0u8; 1];
        self.reader.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn u32(&mut self) -> Result<u32, ProtoError> {
        let mut buf = [0u8; 4];
        self.reader.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn u64(&mut self) -> Result<u64, ProtoError> {
        let mut buf = [0u8; 8];
        self.reader.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    fn bytes(&mut self) -> Result<Vec<u8>, ProtoError> {
        let len = self.u32()? as usize;
        let mut buf = Vec::new();
        (&mut self.reader).take(len as u64).read_to_end(&mut buf)?;
        if buf.len() != len {
            return Err(ProtoError::Io(std::io::ErrorKind::UnexpectedEof.into()));
        }
        Ok(buf)
    }

    fn string(&mut self) -> Result<String, ProtoError> {
        String::from_utf8(self.bytes()?).map_err(|_| ProtoError::InvalidUtf8)
    }

    fn constant(&mut self) -> Result<Constant, ProtoError> {
        match self.u8()? {
            TAG_STRING => Ok(Constant::String(self.string()?)),
            TAG_INT => Ok(Constant::Int(self.u64()? as i64)),
            TAG_FLOAT => Ok(Constant::Float(f64::from_bits(self.u64()?))),
            TAG_TRUE => Ok(Constant::Bool(true)),
            TAG_FALSE => Ok(Constant::Bool(false)),
            TAG_NIL => Ok(Constant::Nil),
            tag => Err(ProtoError::UnknownConstTag(tag)),
        }
    }

    fn info(&mut self) -> Result<Rc<FunctionInfo>, ProtoError> {
        let variadic = self.u8()? != 0;
        let count = self.u32()?;
        let params = (0..count)
            .map(|_| {
                Ok(Parameter {
                    name: self.string()?,
                    default: self.constant()?,
                })
            })
            .collect::<Result<Vec<_>, ProtoError>>()?;
        let text = self.bytes()?;
        Ok(Rc::new(FunctionInfo {
            params,
            variadic,
            text: text.into(),
        }))
    }

    fn proto(&mut self) -> Result<Proto, ProtoError> {
        let file_path = self.string()?;

        let count = self.u32()?;
        let consts = (0..count)
            .map(|_| self.constant())
            .collect::<Result<Vec<_>, _>>()?;

        let count = self.u32()?;
        let mut funcs = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let name = self.string()?;
            let upvalue_count = self.u32()?;
            let upvalues = (0..upvalue_count)
                .map(|_| self.u32())
                .collect::<Result<Vec<_>, _>>()?;
            let info = self.info()?;
            funcs.push(FuncProto {
                name,
                upvalues,
                info,
            });
        }

        let count = self.u32()?;
        let mut anonymous_funcs = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let upvalue_count = self.u32()?;
            let mut upvalues = Vec::with_capacity(upvalue_count as usize);
            for _ in 0..upvalue_count {
                let direct = self.u8()? != 0;
                let index = self.u32()?;
                upvalues.push(UpvaluePtr { direct, index });
            }
            let info = self.info()?;
            anonymous_funcs.push(AnonymousFuncProto { upvalues, info });
        }

        let text = self.bytes()?;
        Ok(Proto {
            file_path,
            consts,
            funcs,
            anonymous_funcs,
            text: text.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> Proto {
        let info = Rc::new(FunctionInfo {
            params: vec![
                Parameter {
                    name: "a".to_string(),
                    default: Constant::Nil,
                },
                Parameter {
                    name: "b".to_string(),
                    default: Constant::Float(1.5),
                },
            ],
            variadic: true,
            text: vec![39, 39, 65, 0, 0, 0, 0].into(),
        });
        Proto {
            file_path: "main.gs".to_string(),
            consts: vec![
                Constant::String("hi".to_string()),
                Constant::Int(-7),
                Constant::Bool(true),
                Constant::Bool(false),
                Constant::Nil,
            ],
            funcs: vec![FuncProto {
                name: "f".to_string(),
                upvalues: vec![0, 3],
                info: info.clone(),
            }],
            anonymous_funcs: vec![AnonymousFuncProto {
                upvalues: vec![
                    UpvaluePtr {
                        direct: true,
                        index: 1,
                    },
                    UpvaluePtr {
                        direct: false,
                        index: 0,
                    },
                ],
                info,
            }],
            text: vec![23, 44].into(),
        }
    }

    #[test]
    fn test_round_trip_reencodes_identically() {
        let protos = vec![sample(), sample()];
        let mut first = Vec::new();
        write_protos(&mut first, &protos).unwrap();

        let decoded = read_protos(first.as_slice()).unwrap();
        assert_eq!(decoded, protos);

        let mut second = Vec::new();
        write_protos(&mut second, &decoded).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_header_layout() {
        let mut out = Vec::new();
        write_protos(&mut out, &[]).unwrap();
        assert_eq!(out, vec![0x6c, 0x6a, 0x68, 0x00, 0, 1, 0, 0, 0, 0]);
    }

    #[test]
    fn test_bad_magic_and_tag() {
        let err = read_protos(&[1u8, 2, 3, 4, 0, 1, 0, 0, 0, 0][..]).unwrap_err();
        assert!(matches!(err, ProtoError::InvalidMagic(_)));

        let mut out = Vec::new();
        write_protos(&mut out, &[sample()]).unwrap();
        // First const tag sits right after the path and the const count.
        let tag_at = 10 + 4 + "main.gs".len() + 4;
        out[tag_at] = 9;
        let err = read_protos(out.as_slice()).unwrap_err();
        assert!(matches!(err, ProtoError::UnknownConstTag(9)));
    }

    #[test]
    fn test_truncated_input_is_error() {
        let mut out = Vec::new();
        write_protos(&mut out, &[sample()]).unwrap();
        out.truncate(out.len() - 1);
        assert!(read_protos(out.as_slice()).is_err());
    }

    #[test]
    fn test_is_proto_file() {
        let dir = tempfile::tempdir().unwrap();
        let proto_path = dir.path().join("a.gsproto");
        save(&proto_path, &[sample()]).unwrap();
        assert!(is_proto_file(&proto_path));
        assert_eq!(load(&proto_path).unwrap(), vec![sample()]);

        let source_path = dir.path().join("a.gs");
        std::fs::write(&source_path, "print(1)").unwrap();
        assert!(!is_proto_file(&source_path));
    }
}
