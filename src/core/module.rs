//! Purpose: Resolve, load, and call into native binding modules.
//! Exports: `NativeModule`, `ModuleLoader`, `DylibLoader`, `DylibModule`.
//! Role: The seam between the prober and whatever actually hosts the module.
//! Invariants: Resolution walks the search list in order; the first match wins.
//! Invariants: Every foreign call goes through a fixed, named C signature.
//! Invariants: Argument conversion fails before any foreign code runs.
//! Notes: Loaded libraries stay mapped for as long as the module handle lives.
use std::ffi::{CStr, CString, OsString};
use std::fmt;
use std::path::{Path, PathBuf};

use libc::{c_char, c_int, c_void};
use libloading::{Library, Symbol};
use tracing::debug;

use crate::core::call::{Arg, CallValue, Operation};
use crate::core::error::{Error, ErrorKind};

/// A loaded module that can service calls.
pub trait NativeModule: fmt::Debug {
    fn name(&self) -> &str;

    /// File the module was loaded from, when it came from disk.
    fn location(&self) -> Option<&Path>;

    fn call(&self, op: &Operation) -> Result<CallValue, Error>;
}

pub trait ModuleLoader {
    /// Resolve `name` against `search` (highest priority first) and load it.
    fn load(&self, name: &str, search: &[PathBuf]) -> Result<Box<dyn NativeModule>, Error>;
}

/// Platform file name for a module, e.g. `libcpp_ext.so` or `cpp_ext.dll`.
pub fn module_file_name(name: &str) -> OsString {
    libloading::library_filename(name)
}

#[derive(Copy, Clone, Debug, Default)]
pub struct DylibLoader;

impl DylibLoader {
    pub fn new() -> Self {
        Self
    }

    fn open(path: &Path) -> Result<Library, libloading::Error> {
        #[cfg(unix)]
        {
            let flags = libloading::os::unix::RTLD_NOW | libloading::os::unix::RTLD_GLOBAL;
            unsafe { libloading::os::unix::Library::open(Some(path), flags) }.map(Library::from)
        }
        #[cfg(not(unix))]
        {
            unsafe { Library::new(path) }
        }
    }
}

impl ModuleLoader for DylibLoader {
    fn load(&self, name: &str, search: &[PathBuf]) -> Result<Box<dyn NativeModule>, Error> {
        let file_name = module_file_name(name);
        for dir in search {
            let candidate = dir.join(&file_name);
            if !candidate.is_file() {
                debug!(path = %candidate.display(), "module candidate absent");
                continue;
            }
            debug!(path = %candidate.display(), "loading module");
            let lib = Self::open(&candidate).map_err(|err| {
                Error::new(ErrorKind::Resolution)
                    .with_message(format!("failed to load module `{name}`"))
                    .with_path(&candidate)
                    .with_hint(
                        "The file exists but could not be loaded; \
                         check its dependencies and architecture.",
                    )
                    .with_source(err)
            })?;
            return Ok(Box::new(DylibModule {
                name: name.to_string(),
                path: candidate,
                lib,
            }));
        }
        Err(Error::new(ErrorKind::Resolution)
            .with_message(format!(
                "no module named `{name}` ({} not found in {} search director{})",
                file_name.to_string_lossy(),
                search.len(),
                if search.len() == 1 { "y" } else { "ies" }
            ))
            .with_hint("Build the binding first, or pass --root/--dir pointing at its output."))
    }
}

/// Known C signatures of the binding surface.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Signature {
    /// `int add(int, int)`
    IntPairToInt,
    /// `char *get_greeting(const char *)`, released by `free_string` when exported.
    StrToOwnedStr,
    /// `<Class>_new()`, `void <Class>_<method>(void *, const char *)`, `<Class>_free(void *)`.
    MethodStr,
}

fn signature_for(op: &Operation) -> Option<Signature> {
    match (op.class(), op.name()) {
        (None, "add") => Some(Signature::IntPairToInt),
        (None, "get_greeting") => Some(Signature::StrToOwnedStr),
        (Some(_), "log") => Some(Signature::MethodStr),
        _ => None,
    }
}

pub struct DylibModule {
    name: String,
    path: PathBuf,
    lib: Library,
}

impl fmt::Debug for DylibModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DylibModule")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish()
    }
}

impl NativeModule for DylibModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn location(&self) -> Option<&Path> {
        Some(&self.path)
    }

    fn call(&self, op: &Operation) -> Result<CallValue, Error> {
        let signature = signature_for(op).ok_or_else(|| {
            invocation_error(op, "no C signature is known for this call")
                .with_hint("Supported calls: add(a, b), get_greeting(name), <Class>.log(message).")
        })?;
        match signature {
            Signature::IntPairToInt => {
                let (a, b) = int_pair(op)?;
                let func: Symbol<unsafe extern "C" fn(c_int, c_int) -> c_int> =
                    self.symbol(op, op.name())?;
                let out = unsafe { func(a, b) };
                Ok(CallValue::Int(i64::from(out)))
            }
            Signature::StrToOwnedStr => {
                let arg = single_str(op)?;
                let func: Symbol<unsafe extern "C" fn(*const c_char) -> *mut c_char> =
                    self.symbol(op, op.name())?;
                let raw = unsafe { func(arg.as_ptr()) };
                if raw.is_null() {
                    return Err(invocation_error(op, "returned a null string"));
                }
                let text = unsafe { CStr::from_ptr(raw) }.to_string_lossy().into_owned();
                let free: Result<Symbol<unsafe extern "C" fn(*mut c_char)>, _> =
                    unsafe { self.lib.get(b"free_string") };
                if let Ok(free) = free {
                    unsafe { free(raw) };
                }
                Ok(CallValue::Str(text))
            }
            Signature::MethodStr => {
                let class = op.class().unwrap_or_default();
                let arg = single_str(op)?;
                let ctor: Symbol<unsafe extern "C" fn() -> *mut c_void> =
                    self.symbol(op, &format!("{class}_new"))?;
                let method: Symbol<unsafe extern "C" fn(*mut c_void, *const c_char)> =
                    self.symbol(op, &format!("{class}_{}", op.name()))?;
                let free: Symbol<unsafe extern "C" fn(*mut c_void)> =
                    self.symbol(op, &format!("{class}_free"))?;
                let instance = unsafe { ctor() };
                if instance.is_null() {
                    return Err(invocation_error(op, format!("{class}_new returned null")));
                }
                unsafe {
                    method(instance, arg.as_ptr());
                    free(instance);
                }
                Ok(CallValue::Unit)
            }
        }
    }
}

impl DylibModule {
    fn symbol<T>(&self, op: &Operation, symbol: &str) -> Result<Symbol<'_, T>, Error> {
        unsafe { self.lib.get::<T>(symbol.as_bytes()) }.map_err(|err| {
            invocation_error(op, format!("module has no attribute `{symbol}`"))
                .with_path(&self.path)
                .with_source(err)
        })
    }
}

fn invocation_error(op: &Operation, message: impl Into<String>) -> Error {
    Error::new(ErrorKind::Invocation).with_message(format!("{op}: {}", message.into()))
}

fn int_pair(op: &Operation) -> Result<(c_int, c_int), Error> {
    match op.args() {
        [Arg::Int(a), Arg::Int(b)] => Ok((to_c_int(op, *a)?, to_c_int(op, *b)?)),
        args => Err(invocation_error(
            op,
            format!("expected 2 integer arguments, got {}", describe_args(args)),
        )),
    }
}

fn single_str(op: &Operation) -> Result<CString, Error> {
    match op.args() {
        [Arg::Str(text)] => CString::new(text.as_str())
            .map_err(|_| invocation_error(op, "string argument contains a NUL byte")),
        args => Err(invocation_error(
            op,
            format!("expected 1 string argument, got {}", describe_args(args)),
        )),
    }
}

fn to_c_int(op: &Operation, value: i64) -> Result<c_int, Error> {
    c_int::try_from(value)
        .map_err(|_| invocation_error(op, format!("integer {value} does not fit a C int")))
}

fn describe_args(args: &[Arg]) -> String {
    if args.is_empty() {
        return "none".to_string();
    }
    args.iter()
        .map(|arg| match arg {
            Arg::Int(_) => "int",
            Arg::Str(_) => "str",
        })
        .collect::<Vec<_>>()
        .join(", ")
}
