//! C interface of the Pulsar module administrator.
//!
//! Every function taking a `PulsarAdmin*` returns `0` on success and the negated
//! [`ErrorKind::code`] of the failure otherwise. The rendered failure is kept per thread
//! and read back with [`pulsar_last_error`]. Panics never cross the boundary; they are
//! reported as `Internal` errors.

use pulsar::modules::{KindMut, Module, ModuleBase, TestModule};
use pulsar::{CoreException, CoreResult, ErrorKind, ModuleAdministrator};
use std::cell::RefCell;
use std::ffi::{CStr, CString, c_char, c_int, c_void};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::ptr;
use tracing::error;

/// Opaque handle owning a module administrator.
pub struct PulsarAdmin {
    admin: ModuleAdministrator,
}

/// Self-test of a module registered from C. Returns `0` on success; on failure it may
/// call [`pulsar_set_error`] before returning a non-zero status.
pub type PulsarTestCallback = unsafe extern "C" fn(user_data: *mut c_void, key: *const c_char) -> c_int;

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
    static CALLBACK_ERROR: RefCell<Option<String>> = const { RefCell::new(None) };
}

fn c_string(text: &str) -> CString {
    CString::new(text.replace('\0', " ")).unwrap_or_default()
}

fn record_error(e: &CoreException) -> c_int {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(c_string(&e.to_string())));
    -e.kind().code()
}

/// Runs `f`, converting errors and panics to a negative status.
fn guard(f: impl FnOnce() -> CoreResult<c_int>) -> c_int {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(status)) => status,
        Ok(Err(e)) => record_error(&e),
        Err(_) => {
            error!("Panic caught at the C boundary.");
            record_error(&CoreException::new(ErrorKind::Internal, "Panic inside the Pulsar runtime"))
        }
    }
}

fn null_argument(name: &str) -> CoreException {
    CoreException::new(ErrorKind::Internal, "Null pointer passed across the C boundary")
        .with("argument", name)
}

/// # Safety
///
/// `ptr` is null or a valid NUL-terminated string that outlives `'a`.
unsafe fn str_arg<'a>(ptr: *const c_char, name: &str) -> CoreResult<&'a str> {
    if ptr.is_null() {
        return Err(null_argument(name));
    }
    // SAFETY: non-null and NUL-terminated per the caller contract.
    let raw = unsafe { CStr::from_ptr(ptr) };
    raw.to_str().map_err(|_| {
        CoreException::new(ErrorKind::TypeMismatch, "String argument is not valid UTF-8")
            .with("argument", name)
    })
}

/// # Safety
///
/// `ptr` is null or was returned by [`pulsar_admin_create`] and not yet freed.
unsafe fn admin_arg<'a>(ptr: *const PulsarAdmin) -> CoreResult<&'a ModuleAdministrator> {
    // SAFETY: per the caller contract.
    unsafe { ptr.as_ref() }
        .map(|handle| &handle.admin)
        .ok_or_else(|| null_argument("admin"))
}

/// Creates an administrator. Release it with [`pulsar_admin_free`].
#[unsafe(no_mangle)]
pub extern "C" fn pulsar_admin_create() -> *mut PulsarAdmin {
    Box::into_raw(Box::new(PulsarAdmin {
        admin: ModuleAdministrator::new(),
    }))
}

/// # Safety
///
/// `admin` is null or a handle from [`pulsar_admin_create`] that is not used afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pulsar_admin_free(admin: *mut PulsarAdmin) {
    if !admin.is_null() {
        // SAFETY: the handle was produced by `Box::into_raw` and ownership returns here.
        drop(unsafe { Box::from_raw(admin) });
    }
}

/// # Safety
///
/// Pointer arguments are valid handles and NUL-terminated strings, as for every
/// function of this interface.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pulsar_admin_add_path(admin: *const PulsarAdmin, path: *const c_char) -> c_int {
    guard(|| {
        let admin = unsafe { admin_arg(admin)? };
        admin.add_path(unsafe { str_arg(path, "path")? });
        Ok(0)
    })
}

/// # Safety
///
/// See [`pulsar_admin_add_path`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pulsar_admin_load_module(
    admin: *const PulsarAdmin,
    supermodule: *const c_char,
    name: *const c_char,
    key: *const c_char,
) -> c_int {
    guard(|| {
        let admin = unsafe { admin_arg(admin)? };
        let (supermodule, name, key) = unsafe {
            (
                str_arg(supermodule, "supermodule")?,
                str_arg(name, "name")?,
                str_arg(key, "key")?,
            )
        };
        admin.load_module(supermodule, name, key)?;
        Ok(0)
    })
}

/// Returns `1` if `key` is registered, `0` if not.
///
/// # Safety
///
/// See [`pulsar_admin_add_path`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pulsar_admin_has_key(admin: *const PulsarAdmin, key: *const c_char) -> c_int {
    guard(|| {
        let admin = unsafe { admin_arg(admin)? };
        Ok(c_int::from(admin.has_key(unsafe { str_arg(key, "key")? })))
    })
}

/// Number of registered keys, or a negative status.
///
/// # Safety
///
/// See [`pulsar_admin_add_path`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pulsar_admin_size(admin: *const PulsarAdmin) -> c_int {
    guard(|| {
        let admin = unsafe { admin_arg(admin)? };
        c_int::try_from(admin.size())
            .map_err(|_| CoreException::new(ErrorKind::OutOfRange, "Key count does not fit a C int"))
    })
}

unsafe fn change_option(
    admin: *const PulsarAdmin,
    key: *const c_char,
    option: *const c_char,
    value: impl FnOnce() -> CoreResult<pulsar::core::options::OptionValue>,
) -> c_int {
    guard(|| {
        let admin = unsafe { admin_arg(admin)? };
        let (key, option) = unsafe { (str_arg(key, "key")?, str_arg(option, "option")?) };
        admin.change_option(key, option, value()?)?;
        Ok(0)
    })
}

/// # Safety
///
/// See [`pulsar_admin_add_path`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pulsar_admin_change_option_int(
    admin: *const PulsarAdmin,
    key: *const c_char,
    option: *const c_char,
    value: i64,
) -> c_int {
    unsafe { change_option(admin, key, option, || Ok(value.into())) }
}

/// # Safety
///
/// See [`pulsar_admin_add_path`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pulsar_admin_change_option_float(
    admin: *const PulsarAdmin,
    key: *const c_char,
    option: *const c_char,
    value: f64,
) -> c_int {
    unsafe { change_option(admin, key, option, || Ok(value.into())) }
}

/// Any non-zero `value` is true.
///
/// # Safety
///
/// See [`pulsar_admin_add_path`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pulsar_admin_change_option_bool(
    admin: *const PulsarAdmin,
    key: *const c_char,
    option: *const c_char,
    value: c_int,
) -> c_int {
    unsafe { change_option(admin, key, option, || Ok((value != 0).into())) }
}

/// # Safety
///
/// See [`pulsar_admin_add_path`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pulsar_admin_change_option_string(
    admin: *const PulsarAdmin,
    key: *const c_char,
    option: *const c_char,
    value: *const c_char,
) -> c_int {
    unsafe { change_option(admin, key, option, || Ok(str_arg(value, "value")?.into())) }
}

/// Builds a top-level instance of `key` and runs its self-test.
///
/// # Safety
///
/// See [`pulsar_admin_add_path`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pulsar_admin_run_test(admin: *const PulsarAdmin, key: *const c_char) -> c_int {
    guard(|| {
        let admin = unsafe { admin_arg(admin)? };
        admin.run_test(unsafe { str_arg(key, "key")? })?;
        Ok(0)
    })
}

#[derive(Clone, Copy)]
struct UserData(*mut c_void);

// SAFETY: the host that registers a callback vouches for `user_data` being usable from
// whichever thread runs the module's test.
unsafe impl Send for UserData {}
unsafe impl Sync for UserData {}

struct CallbackTest {
    base: ModuleBase,
    callback: PulsarTestCallback,
    user_data: UserData,
}

impl Module for CallbackTest {
    fn base(&self) -> &ModuleBase {
        &self.base
    }

    fn run_test(&mut self) -> CoreResult<()> {
        let key = c_string(self.base.key());
        CALLBACK_ERROR.with(|slot| slot.borrow_mut().take());
        // SAFETY: the callback and its user data were registered together by the host.
        let status = unsafe { (self.callback)(self.user_data.0, key.as_ptr()) };
        if status == 0 {
            return Ok(());
        }
        let message = CALLBACK_ERROR
            .with(|slot| slot.borrow_mut().take())
            .unwrap_or_else(|| format!("Test callback returned {status}"));
        Err(CoreException::kernel(message).with("status", status))
    }

    fn kind_mut(&mut self) -> KindMut<'_> {
        KindMut::TestModule(self)
    }
}

impl TestModule for CallbackTest {}

/// Registers `callback` as the self-test of a new lambda module `name` under `key`.
///
/// # Safety
///
/// See [`pulsar_admin_add_path`]. `callback` must stay callable with `user_data` for as
/// long as the administrator lives.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pulsar_admin_register_test(
    admin: *const PulsarAdmin,
    name: *const c_char,
    key: *const c_char,
    callback: Option<PulsarTestCallback>,
    user_data: *mut c_void,
) -> c_int {
    guard(|| {
        let admin = unsafe { admin_arg(admin)? };
        let (name, key) = unsafe { (str_arg(name, "name")?, str_arg(key, "key")?) };
        let callback = callback.ok_or_else(|| null_argument("callback"))?;
        let user_data = UserData(user_data);
        admin.load_lambda_module(
            move |base| {
                Ok(Box::new(CallbackTest {
                    base,
                    callback,
                    user_data,
                }) as Box<dyn Module>)
            },
            name,
            key,
        )?;
        Ok(0)
    })
}

/// The rendered last failure on this thread, or null if nothing failed yet. The string
/// stays valid until the next failure on the same thread.
#[unsafe(no_mangle)]
pub extern "C" fn pulsar_last_error() -> *const c_char {
    LAST_ERROR.with(|slot| slot.borrow().as_ref().map_or(ptr::null(), |s| s.as_ptr()))
}

#[unsafe(no_mangle)]
pub extern "C" fn pulsar_clear_error() {
    LAST_ERROR.with(|slot| slot.borrow_mut().take());
}

/// Sets the message reported when a test callback running on this thread fails.
///
/// # Safety
///
/// `message` is null or a valid NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pulsar_set_error(message: *const c_char) {
    let text = if message.is_null() {
        String::new()
    } else {
        // SAFETY: non-null and NUL-terminated per the contract above.
        unsafe { CStr::from_ptr(message) }.to_string_lossy().into_owned()
    };
    CALLBACK_ERROR.with(|slot| *slot.borrow_mut() = Some(text));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn last_error() -> String {
        let ptr = pulsar_last_error();
        assert!(!ptr.is_null());
        unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
    }

    unsafe extern "C" fn passing(_: *mut c_void, _: *const c_char) -> c_int {
        0
    }

    unsafe extern "C" fn failing(user_data: *mut c_void, key: *const c_char) -> c_int {
        let calls = unsafe { &mut *(user_data as *mut u32) };
        *calls += 1;
        let key = unsafe { CStr::from_ptr(key) }.to_string_lossy().into_owned();
        let message = CString::new(format!("{key} is broken")).unwrap();
        unsafe { pulsar_set_error(message.as_ptr()) };
        7
    }

    #[test]
    fn builtin_module_lifecycle() {
        let admin = pulsar_admin_create();
        unsafe {
            assert_eq!(
                pulsar_admin_load_module(admin, c"pulsar_builtin".as_ptr(), c"ChildTestRunner".as_ptr(), c"RUN".as_ptr()),
                0
            );
            assert_eq!(
                pulsar_admin_load_module(admin, c"pulsar_builtin".as_ptr(), c"CacheRoundTripTest".as_ptr(), c"CACHE".as_ptr()),
                0
            );
            assert_eq!(pulsar_admin_has_key(admin, c"RUN".as_ptr()), 1);
            assert_eq!(pulsar_admin_has_key(admin, c"NOPE".as_ptr()), 0);
            assert_eq!(pulsar_admin_size(admin), 2);

            let status = pulsar_admin_run_test(admin, c"RUN".as_ptr());
            assert_eq!(status, -ErrorKind::UnmetRequiredOption.code());
            assert!(last_error().contains("OTHER_MODULE"));

            assert_eq!(
                pulsar_admin_change_option_string(admin, c"RUN".as_ptr(), c"OTHER_MODULE".as_ptr(), c"CACHE".as_ptr()),
                0
            );
            assert_eq!(pulsar_admin_run_test(admin, c"RUN".as_ptr()), 0);

            let status =
                pulsar_admin_change_option_int(admin, c"RUN".as_ptr(), c"OTHER_MODULE".as_ptr(), 4);
            assert_eq!(status, -ErrorKind::OptionLocked.code());
            pulsar_admin_free(admin);
        }
    }

    #[test]
    fn callback_failures_are_kernel_errors() {
        let admin = pulsar_admin_create();
        let mut calls = 0_u32;
        unsafe {
            let data = &mut calls as *mut u32 as *mut c_void;
            assert_eq!(
                pulsar_admin_register_test(admin, c"Good".as_ptr(), c"GOOD".as_ptr(), Some(passing), ptr::null_mut()),
                0
            );
            assert_eq!(
                pulsar_admin_register_test(admin, c"Bad".as_ptr(), c"BAD".as_ptr(), Some(failing), data),
                0
            );
            assert_eq!(pulsar_admin_run_test(admin, c"GOOD".as_ptr()), 0);
            assert_eq!(pulsar_admin_run_test(admin, c"BAD".as_ptr()), -ErrorKind::Kernel.code());
            let text = last_error();
            assert!(text.contains("BAD is broken"));
            assert!(text.contains("status : 7"));

            let status = pulsar_admin_register_test(admin, c"None".as_ptr(), c"NONE".as_ptr(), None, ptr::null_mut());
            assert_eq!(status, -ErrorKind::Internal.code());
            pulsar_admin_free(admin);
        }
        assert_eq!(calls, 1);
    }

    #[test]
    fn null_and_missing_arguments_are_reported() {
        unsafe {
            assert_eq!(pulsar_admin_size(ptr::null()), -ErrorKind::Internal.code());
            assert!(last_error().contains("admin"));

            let admin = pulsar_admin_create();
            let dir = tempfile::tempdir().unwrap();
            let path = CString::new(dir.path().to_string_lossy().into_owned()).unwrap();
            assert_eq!(pulsar_admin_add_path(admin, path.as_ptr()), 0);
            let status =
                pulsar_admin_load_module(admin, c"absent".as_ptr(), c"M".as_ptr(), c"K".as_ptr());
            assert_eq!(status, -ErrorKind::SupermoduleNotFound.code());
            assert_eq!(pulsar_admin_run_test(admin, ptr::null()), -ErrorKind::Internal.code());
            pulsar_admin_free(admin);
        }
        pulsar_clear_error();
        assert!(pulsar_last_error().is_null());
    }
}
