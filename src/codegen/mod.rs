//! The compiling backend: C generation, external build, dynamic loading.
//!
//! `CBackend` lowers a module to C ([`c::generate`]), builds it into a
//! shared object with the configured [`Toolchain`], loads the artifact
//! with libloading, and exposes the same [`Program`] interface as the
//! interpreter. The loaded library and its build directory are owned by
//! the returned [`CompiledModule`], so every exit path unloads the
//! library before the directory is removed.

pub mod c;
pub mod toolchain;

use std::cell::{RefCell, RefMut};
use std::collections::HashMap;
use std::ffi::c_void;
use std::rc::Rc;

use libloading::{Library, Symbol};
use tempfile::TempDir;

use crate::backend::{Backend, Program};
use crate::buffer::{BufData, NdBuffer};
use crate::error::Error;
use crate::ftype::{ElemType, FType};
use crate::imp::Node;
use crate::value::Value;

pub use toolchain::Toolchain;

/// The host-side mirror of the generated `skf_buf` descriptor. The
/// shape/ndim/len fields are read by the generated C, not by Rust.
#[repr(C)]
#[allow(dead_code)]
struct RawBuf {
    data: *mut c_void,
    shape: *const i64,
    ndim: i64,
    len: i64,
}

pub struct CBackend {
    toolchain: Toolchain,
}

impl CBackend {
    /// Backend with the environment-resolved toolchain.
    pub fn new() -> Self {
        Self {
            toolchain: Toolchain::from_env(),
        }
    }

    pub fn with_toolchain(toolchain: Toolchain) -> Self {
        Self { toolchain }
    }

    /// Whether compiled execution is possible in this environment.
    pub fn available(&self) -> bool {
        self.toolchain.available()
    }
}

impl Default for CBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for CBackend {
    fn compile(&self, module: &Node) -> Result<Box<dyn Program>, Error> {
        let source = c::generate(module)?;
        log::debug!("generated {} byte(s) of C", source.len());

        let mut signatures = HashMap::new();
        let Node::Module(items) = module else {
            unreachable!("generate() accepted the module");
        };
        for item in items {
            let (name, params, _) = c::split_function(item)?;
            let param_ftypes = params.into_iter().map(|p| p.ftype).collect();
            signatures.insert(name.name.clone(), (param_ftypes, name.ftype));
        }

        let dir = tempfile::tempdir()?;
        let lib_path = self.toolchain.build(&source, dir.path(), "module")?;
        let library = unsafe { Library::new(&lib_path) }.map_err(|err| Error::BuildFailure {
            command: format!("load {}", lib_path.display()),
            stderr: err.to_string(),
            source: source.clone(),
        })?;

        Ok(Box::new(CompiledModule {
            library,
            _dir: dir,
            signatures,
        }))
    }
}

/// A loaded native module. Field order matters: the library unloads
/// before the temporary build directory is removed.
pub struct CompiledModule {
    library: Library,
    _dir: TempDir,
    signatures: HashMap<String, (Vec<FType>, FType)>,
}

/// Per-argument marshalled storage, alive across the native call.
enum ArgStorage<'a> {
    /// Scalars and aggregates, flattened to 8-byte words.
    Words(Vec<u64>),
    /// A buffer descriptor pointing into the (mutably borrowed) data.
    Buf {
        raw: Box<RawBuf>,
        _shape: Box<[i64]>,
        _guard: RefMut<'a, NdBuffer>,
    },
}

impl Program for CompiledModule {
    fn call(&self, name: &str, args: &[Value]) -> Result<Value, Error> {
        let (param_ftypes, ret_ftype) = self
            .signatures
            .get(name)
            .ok_or_else(|| Error::UnboundVariable(name.to_string()))?;
        if args.len() != param_ftypes.len() {
            return Err(Error::Arity {
                name: name.to_string(),
                expected: param_ftypes.len(),
                got: args.len(),
            });
        }

        let mut storages: Vec<ArgStorage> = Vec::with_capacity(args.len());
        let mut buffer_args: Vec<(*mut c_void, Rc<RefCell<NdBuffer>>)> = Vec::new();
        for (arg, ftype) in args.iter().zip(param_ftypes) {
            let actual = arg.ftype()?;
            if actual != *ftype {
                return Err(Error::mismatch(format!(
                    "`{name}` expects {ftype}, got {actual}"
                )));
            }
            match arg {
                Value::Buffer(cell) => {
                    let mut guard = cell.try_borrow_mut().map_err(|_| {
                        Error::mismatch("the same buffer was passed to a compiled call twice")
                    })?;
                    let shape: Box<[i64]> =
                        guard.shape().iter().map(|&extent| extent as i64).collect();
                    let ndim = guard.ndim() as i64;
                    let len = guard.len() as i64;
                    let data = match guard.data_mut() {
                        BufData::I64(v) => v.as_mut_ptr() as *mut c_void,
                        BufData::F64(v) => v.as_mut_ptr() as *mut c_void,
                    };
                    let raw = Box::new(RawBuf {
                        data,
                        shape: shape.as_ptr(),
                        ndim,
                        len,
                    });
                    buffer_args.push((data, Rc::clone(cell)));
                    storages.push(ArgStorage::Buf {
                        raw,
                        _shape: shape,
                        _guard: guard,
                    });
                }
                other => {
                    let mut words = Vec::new();
                    encode_words(other, ftype, &mut words)?;
                    storages.push(ArgStorage::Words(words));
                }
            }
        }

        // Pointers are taken only after every storage is in place.
        let argv: Vec<*mut c_void> = storages
            .iter()
            .map(|storage| match storage {
                ArgStorage::Words(words) => words.as_ptr() as *mut c_void,
                ArgStorage::Buf { raw, .. } => raw.as_ref() as *const RawBuf as *mut c_void,
            })
            .collect();

        let mut ret = [0u64; 16];
        let symbol_name = format!("{name}__entry");
        unsafe {
            let entry: Symbol<unsafe extern "C" fn(*mut *mut c_void, *mut c_void)> = self
                .library
                .get(symbol_name.as_bytes())
                .map_err(|err| Error::UnboundVariable(format!("{name} ({err})")))?;
            entry(argv.as_ptr() as *mut *mut c_void, ret.as_mut_ptr() as *mut c_void);
        }

        // Release the data borrows before handing buffers back.
        drop(storages);
        decode_result(&ret, ret_ftype, &buffer_args)
    }
}

/// Flatten a non-buffer value to 8-byte words per its FType layout.
fn encode_words(value: &Value, ftype: &FType, out: &mut Vec<u64>) -> Result<(), Error> {
    match (value, ftype) {
        (Value::Int(v), FType::Scalar(ElemType::I64)) => out.push(*v as u64),
        (Value::Float(v), FType::Scalar(ElemType::F64)) => out.push(v.to_bits()),
        (Value::Bool(v), FType::Scalar(ElemType::Bool)) => out.push(u64::from(*v)),
        (Value::Tuple(items), FType::Tuple(ftypes)) if items.len() == ftypes.len() => {
            for (item, fty) in items.iter().zip(ftypes) {
                encode_words(item, fty, out)?;
            }
        }
        (Value::Record(fields), FType::Record(ftypes)) if fields.len() == ftypes.len() => {
            for ((_, field), (_, fty)) in fields.iter().zip(ftypes) {
                encode_words(field, fty, out)?;
            }
        }
        (value, ftype) => {
            return Err(Error::mismatch(format!(
                "cannot marshal {} as {ftype}",
                value.type_name()
            )))
        }
    }
    Ok(())
}

fn decode_result(
    words: &[u64; 16],
    ftype: &FType,
    buffers: &[(*mut c_void, Rc<RefCell<NdBuffer>>)],
) -> Result<Value, Error> {
    if ftype.is_tensor() {
        // The callee returned one of its argument descriptors; map the
        // data pointer back to the corresponding host buffer.
        let raw: RawBuf = unsafe { std::ptr::read(words.as_ptr() as *const RawBuf) };
        return buffers
            .iter()
            .find(|(data, _)| *data == raw.data)
            .map(|(_, cell)| Value::Buffer(Rc::clone(cell)))
            .ok_or_else(|| Error::mismatch("compiled function returned an unknown buffer"));
    }
    let mut at = 0usize;
    decode_words(words, &mut at, ftype)
}

fn take_word(words: &[u64], at: &mut usize) -> Result<u64, Error> {
    let word = words
        .get(*at)
        .copied()
        .ok_or_else(|| Error::mismatch("return value wider than the return buffer"))?;
    *at += 1;
    Ok(word)
}

fn decode_words(words: &[u64], at: &mut usize, ftype: &FType) -> Result<Value, Error> {
    match ftype {
        FType::Scalar(ElemType::I64) => Ok(Value::Int(take_word(words, at)? as i64)),
        FType::Scalar(ElemType::F64) => Ok(Value::Float(f64::from_bits(take_word(words, at)?))),
        FType::Scalar(ElemType::Bool) => Ok(Value::Bool(take_word(words, at)? != 0)),
        FType::Tuple(items) => {
            let values = items
                .iter()
                .map(|item| decode_words(words, at, item))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Tuple(values))
        }
        FType::Record(fields) => {
            let values = fields
                .iter()
                .map(|(name, item)| Ok((name.clone(), decode_words(words, at, item)?)))
                .collect::<Result<Vec<_>, Error>>()?;
            Ok(Value::Record(values))
        }
        FType::Tensor { .. } => Err(Error::mismatch(
            "buffers cannot appear inside aggregate return values",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_flattens_nested_aggregates() {
        let value = Value::Tuple(vec![
            Value::Tuple(vec![Value::Int(1), Value::Int(2)]),
            Value::Int(3),
        ]);
        let inner = FType::Tuple(vec![
            FType::Scalar(ElemType::I64),
            FType::Scalar(ElemType::I64),
        ]);
        let ftype = FType::Tuple(vec![inner, FType::Scalar(ElemType::I64)]);
        let mut words = Vec::new();
        encode_words(&value, &ftype, &mut words).unwrap();
        assert_eq!(words, vec![1, 2, 3]);
    }

    #[test]
    fn test_decode_round_trips_encode() {
        let ftype = FType::Tuple(vec![
            FType::Scalar(ElemType::I64),
            FType::Scalar(ElemType::F64),
        ]);
        let value = Value::Tuple(vec![Value::Int(-4), Value::Float(2.5)]);
        let mut words = Vec::new();
        encode_words(&value, &ftype, &mut words).unwrap();
        let mut padded = [0u64; 16];
        padded[..words.len()].copy_from_slice(&words);
        let mut at = 0;
        let decoded = decode_words(&padded, &mut at, &ftype).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_encode_rejects_mismatched_value() {
        let mut words = Vec::new();
        let err = encode_words(
            &Value::Int(1),
            &FType::Scalar(ElemType::F64),
            &mut words,
        )
        .unwrap_err();
        assert!(matches!(err, Error::TypeMismatch(_)));
    }
}
