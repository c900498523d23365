//! Filesystem builtins. Host errors are thrown as strings so scripts can
//! catch them.

use std::cell::RefCell;
use std::fs::{self, DirBuilder, File, Metadata, OpenOptions, Permissions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt, PermissionsExt};
use std::path::Path;
use std::rc::Rc;
use std::time::UNIX_EPOCH;

use crate::value::{FileHandle, HashKey, Object, Value};
use crate::vm::vm::Vm;

use super::{fatal, NativeError, NativeResult};

// Open flags, Linux values.
const O_ACCMODE: i64 = 0o3;
const O_WRONLY: i64 = 0o1;
const O_RDWR: i64 = 0o2;
const O_CREATE: i64 = 0o100;
const O_EXCL: i64 = 0o200;
const O_TRUNC: i64 = 0o1000;
const O_APPEND: i64 = 0o2000;

fn string_arg<'a>(value: Option<&'a Value>, func: &str) -> Result<&'a str, NativeError> {
    match value {
        Some(Value::String(s)) => Ok(s),
        _ => Err(fatal(func, "a path string")),
    }
}

fn int_arg(value: Option<&Value>, func: &str) -> Result<i64, NativeError> {
    match value {
        Some(Value::Int(n)) => Ok(*n),
        _ => Err(fatal(func, "an int")),
    }
}

fn handle_arg<'a>(
    value: Option<&'a Value>,
    func: &str,
) -> Result<&'a Rc<RefCell<FileHandle>>, NativeError> {
    match value {
        Some(Value::File(handle)) => Ok(handle),
        _ => Err(fatal(func, "a file")),
    }
}

/// Run `op` against the open file behind `value`.
fn with_file<T>(
    value: Option<&Value>,
    func: &str,
    op: impl FnOnce(&mut File) -> std::io::Result<T>,
) -> Result<T, NativeError> {
    let handle = handle_arg(value, func)?;
    let mut handle = handle.borrow_mut();
    let path = handle.path.clone();
    let file = handle
        .file
        .as_mut()
        .ok_or_else(|| NativeError::throw(format!("{}: file already closed", path)))?;
    Ok(op(file)?)
}

fn stat_object(name: String, meta: &Metadata) -> Value {
    let mod_time = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_secs() as i64);
    let mut obj = Object::with_capacity(5);
    obj.set(HashKey::from("name"), Value::String(name));
    obj.set(HashKey::from("size"), Value::Int(meta.len() as i64));
    obj.set(
        HashKey::from("mode"),
        Value::Int((meta.permissions().mode() & 0o7777) as i64),
    );
    obj.set(HashKey::from("modTime"), Value::Int(mod_time));
    obj.set(HashKey::from("isDir"), Value::Bool(meta.is_dir()));
    Value::object(obj)
}

fn base_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map_or_else(|| path.to_string(), |n| n.to_string_lossy().into_owned())
}

fn list_dir(path: &str) -> Result<Value, NativeError> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        entries.push(stat_object(
            entry.file_name().to_string_lossy().into_owned(),
            &meta,
        ));
    }
    Ok(Value::array(entries))
}

/// `__open(path, flags, mode)`.
pub fn open(_vm: &mut Vm, args: Vec<Value>) -> NativeResult {
    let path = string_arg(args.first(), "__open")?;
    let flags = int_arg(args.get(1), "__open")?;
    let mode = args.get(2).map_or(Ok(0o644), |m| int_arg(Some(m), "__open"))?;

    let mut options = OpenOptions::new();
    match flags & O_ACCMODE {
        O_WRONLY => options.write(true),
        O_RDWR => options.read(true).write(true),
        _ => options.read(true),
    };
    if flags & O_APPEND != 0 {
        options.append(true);
    }
    if flags & O_CREATE != 0 {
        if flags & O_EXCL != 0 {
            options.create_new(true);
        } else {
            options.create(true);
        }
    }
    if flags & O_TRUNC != 0 {
        options.truncate(true);
    }
    options.mode(mode as u32);

    let file = options.open(path)?;
    tracing::trace!(path, flags, "opened file");
    Ok(vec![Value::File(Rc::new(RefCell::new(FileHandle::new(
        path, file,
    ))))])
}

/// `__read(file, buf)` fills as much of `buf` as one read returns.
pub fn read(_vm: &mut Vm, args: Vec<Value>) -> NativeResult {
    let Some(Value::Buffer(buf)) = args.get(1) else {
        return Err(fatal("__read", "(file, buffer)"));
    };
    let mut buf = buf.borrow_mut();
    let n = with_file(args.first(), "__read", |file| file.read(&mut buf.data))?;
    Ok(vec![Value::Int(n as i64)])
}

/// `__write(file, buffer|string)`.
pub fn write(_vm: &mut Vm, args: Vec<Value>) -> NativeResult {
    let data = match args.get(1) {
        Some(Value::Buffer(buf)) => buf.borrow().data.clone(),
        Some(Value::String(s)) => s.as_bytes().to_vec(),
        _ => return Err(fatal("__write", "(file, buffer|string)")),
    };
    with_file(args.first(), "__write", |file| file.write_all(&data))?;
    Ok(vec![Value::Int(data.len() as i64)])
}

pub fn close(_vm: &mut Vm, args: Vec<Value>) -> NativeResult {
    let handle = handle_arg(args.first(), "__close")?;
    handle.borrow_mut().file = None;
    Ok(Vec::new())
}

/// `__seek(file, offset, whence)` with whence 0 (start), 1 (current) or
/// 2 (end). Returns the new position.
pub fn seek(_vm: &mut Vm, args: Vec<Value>) -> NativeResult {
    let offset = int_arg(args.get(1), "__seek")?;
    let from = match int_arg(args.get(2), "__seek")? {
        0 if offset >= 0 => SeekFrom::Start(offset as u64),
        0 => return Err(NativeError::throw("negative seek position")),
        1 => SeekFrom::Current(offset),
        2 => SeekFrom::End(offset),
        _ => return Err(fatal("__seek", "whence 0, 1 or 2")),
    };
    let pos = with_file(args.first(), "__seek", |file| file.seek(from))?;
    Ok(vec![Value::Int(pos as i64)])
}

/// Removes a file or an empty directory.
pub fn remove(_vm: &mut Vm, args: Vec<Value>) -> NativeResult {
    let path = string_arg(args.first(), "__remove")?;
    if fs::symlink_metadata(path)?.is_dir() {
        fs::remove_dir(path)?;
    } else {
        fs::remove_file(path)?;
    }
    Ok(Vec::new())
}

pub fn fchmod(_vm: &mut Vm, args: Vec<Value>) -> NativeResult {
    let mode = int_arg(args.get(1), "__fchmod")? as u32;
    with_file(args.first(), "__fchmod", |file| {
        file.set_permissions(Permissions::from_mode(mode))
    })?;
    Ok(Vec::new())
}

pub fn chmod(_vm: &mut Vm, args: Vec<Value>) -> NativeResult {
    let path = string_arg(args.first(), "__chmod")?;
    let mode = int_arg(args.get(1), "__chmod")? as u32;
    fs::set_permissions(path, Permissions::from_mode(mode))?;
    Ok(Vec::new())
}

fn owner_args(args: &[Value], func: &str) -> Result<(Option<u32>, Option<u32>), NativeError> {
    // -1 leaves the id unchanged.
    let id = |v: Option<&Value>| int_arg(v, func).map(|n| u32::try_from(n).ok());
    Ok((id(args.get(1))?, id(args.get(2))?))
}

pub fn fchown(_vm: &mut Vm, args: Vec<Value>) -> NativeResult {
    let (uid, gid) = owner_args(&args, "__fchown")?;
    with_file(args.first(), "__fchown", |file| {
        std::os::unix::fs::fchown(&*file, uid, gid)
    })?;
    Ok(Vec::new())
}

pub fn chown(_vm: &mut Vm, args: Vec<Value>) -> NativeResult {
    let path = string_arg(args.first(), "__chown")?;
    let (uid, gid) = owner_args(&args, "__chown")?;
    std::os::unix::fs::chown(path, uid, gid)?;
    Ok(Vec::new())
}

pub fn fchdir(_vm: &mut Vm, args: Vec<Value>) -> NativeResult {
    let path = handle_arg(args.first(), "__fchdir")?.borrow().path.clone();
    std::env::set_current_dir(path)?;
    Ok(Vec::new())
}

pub fn chdir(_vm: &mut Vm, args: Vec<Value>) -> NativeResult {
    let path = string_arg(args.first(), "__chdir")?;
    std::env::set_current_dir(path)?;
    Ok(Vec::new())
}

pub fn fstat(_vm: &mut Vm, args: Vec<Value>) -> NativeResult {
    let path = handle_arg(args.first(), "__fstat")?.borrow().path.clone();
    let meta = with_file(args.first(), "__fstat", |file| file.metadata())?;
    Ok(vec![stat_object(base_name(&path), &meta)])
}

pub fn stat(_vm: &mut Vm, args: Vec<Value>) -> NativeResult {
    let path = string_arg(args.first(), "__stat")?;
    let meta = fs::metadata(path)?;
    Ok(vec![stat_object(base_name(path), &meta)])
}

pub fn rename(_vm: &mut Vm, args: Vec<Value>) -> NativeResult {
    let from = string_arg(args.first(), "__rename")?;
    let to = string_arg(args.get(1), "__rename")?;
    fs::rename(from, to)?;
    Ok(Vec::new())
}

/// `__mkdir(path, mode[, all])`.
pub fn mkdir(_vm: &mut Vm, args: Vec<Value>) -> NativeResult {
    let path = string_arg(args.first(), "__mkdir")?;
    let mode = args.get(1).map_or(Ok(0o755), |m| int_arg(Some(m), "__mkdir"))?;
    let all = args.get(2).is_some_and(Value::is_truthy);
    DirBuilder::new()
        .recursive(all)
        .mode(mode as u32)
        .create(path)?;
    Ok(Vec::new())
}

pub fn readdir(_vm: &mut Vm, args: Vec<Value>) -> NativeResult {
    let path = string_arg(args.first(), "__readdir")?;
    Ok(vec![list_dir(path)?])
}

pub fn freaddir(_vm: &mut Vm, args: Vec<Value>) -> NativeResult {
    let path = handle_arg(args.first(), "__freaddir")?.borrow().path.clone();
    Ok(vec![list_dir(&path)?])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Buffer;
    use pretty_assertions::assert_eq;

    fn s(text: &str) -> Value {
        Value::String(text.to_string())
    }

    fn field(obj: &Value, key: &str) -> Value {
        match obj {
            Value::Object(o) => o.borrow().get(&HashKey::from(key)).cloned().unwrap_or(Value::Nil),
            other => panic!("Expected object, got {:?}", other),
        }
    }

    #[test]
    fn test_write_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.txt");
        let path = path.to_str().unwrap();
        let mut vm = Vm::default();

        let file = open(
            &mut vm,
            vec![s(path), Value::Int(O_RDWR | O_CREATE | O_TRUNC), Value::Int(0o600)],
        )
        .unwrap()
        .remove(0);
        let n = write(&mut vm, vec![file.clone(), s("hello")]).unwrap();
        assert!(matches!(n[..], [Value::Int(5)]));

        let pos = seek(&mut vm, vec![file.clone(), Value::Int(0), Value::Int(0)]).unwrap();
        assert!(matches!(pos[..], [Value::Int(0)]));

        let buf = Value::buffer(Buffer::new(16));
        let n = read(&mut vm, vec![file.clone(), buf.clone()]).unwrap();
        assert!(matches!(n[..], [Value::Int(5)]));
        match &buf {
            Value::Buffer(b) => assert_eq!(&b.borrow().data[..5], b"hello"),
            _ => unreachable!(),
        }

        let info = fstat(&mut vm, vec![file.clone()]).unwrap().remove(0);
        assert!(matches!(field(&info, "size"), Value::Int(5)));
        assert_eq!(field(&info, "name").to_string(), "data.txt");
        assert!(matches!(field(&info, "mode"), Value::Int(0o600)));

        close(&mut vm, vec![file.clone()]).unwrap();
        assert!(matches!(
            read(&mut vm, vec![file, buf]),
            Err(NativeError::Throw(_))
        ));
    }

    #[test]
    fn test_missing_file_throws() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing");
        let mut vm = Vm::default();
        let result = open(&mut vm, vec![s(path.to_str().unwrap()), Value::Int(0)]);
        assert!(matches!(result, Err(NativeError::Throw(Value::String(_)))));
    }

    #[test]
    fn test_mkdir_readdir_remove() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("a/b");
        let sub = sub.to_str().unwrap();
        let mut vm = Vm::default();

        mkdir(&mut vm, vec![s(sub), Value::Int(0o755), Value::Bool(true)]).unwrap();
        let listing = readdir(&mut vm, vec![s(dir.path().join("a").to_str().unwrap())])
            .unwrap()
            .remove(0);
        match &listing {
            Value::Array(entries) => {
                let entries = entries.borrow();
                assert_eq!(entries.len(), 1);
                assert_eq!(field(&entries[0], "name").to_string(), "b");
                assert!(matches!(field(&entries[0], "isDir"), Value::Bool(true)));
            }
            other => panic!("Expected array, got {:?}", other),
        }

        remove(&mut vm, vec![s(sub)]).unwrap();
        assert!(stat(&mut vm, vec![s(sub)]).is_err());
    }
}
