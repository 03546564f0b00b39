//! C ABI surface (C8): opaque `u64` handles over a process-global registry,
//! so a host language never has to name a Rust generic type.
//!
//! Grounded on `examples/original_source/c-shared/vanadium-index/main.go`
//! (the handle-table-plus-error-out-param shape of every export) and on
//! `examples/other_examples/.../ultra_engine.rs.rs` (the idiomatic
//! `#[no_mangle] pub unsafe extern "C" fn`, `Box::into_raw`/`CString`
//! conventions this module actually compiles against). Every function
//! wraps its body in `catch_unwind` so a panic crosses the boundary as an
//! error message and exit code, never an abort or unwind into C.

use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_float, c_int};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::builder::{new_index, Flavor};
use crate::index::AnnIndex;
use crate::ivf::IvfOptions;
use crate::pq::PqOptions;

static REGISTRY: Lazy<RwLock<HashMap<u64, Box<dyn AnnIndex>>>> = Lazy::new(|| RwLock::new(HashMap::new()));
static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

fn register(index: Box<dyn AnnIndex>) -> u64 {
    let handle = NEXT_HANDLE.fetch_add(1, Ordering::Relaxed);
    REGISTRY.write().insert(handle, index);
    handle
}

/// Converts an error (or a caught panic) into a heap `CString` written
/// through `err_msg`, and returns the `1` every export returns on failure.
/// Callers must pass the returned pointer to [`annix_free_message`].
unsafe fn fail(err_msg: *mut *mut c_char, message: String) -> c_int {
    if !err_msg.is_null() {
        let c_msg = CString::new(message).unwrap_or_else(|_| CString::new("error message contained a NUL byte").unwrap());
        *err_msg = c_msg.into_raw();
    }
    1
}

unsafe fn succeed(err_msg: *mut *mut c_char) -> c_int {
    if !err_msg.is_null() {
        *err_msg = ptr::null_mut();
    }
    0
}

/// Runs `body`, catching panics and turning both panics and `Err`s into
/// the shared `(err_msg, exit code)` contract every export uses.
unsafe fn guard<F>(err_msg: *mut *mut c_char, body: F) -> c_int
where
    F: FnOnce() -> crate::error::Result<()>,
{
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(())) => succeed(err_msg),
        Ok(Err(e)) => fail(err_msg, e.to_string()),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "panic in annix".to_string());
            fail(err_msg, message)
        }
    }
}

unsafe fn floats_from_raw(data: *const c_float, len: usize) -> Vec<f32> {
    if data.is_null() || len == 0 {
        Vec::new()
    } else {
        std::slice::from_raw_parts(data, len).to_vec()
    }
}

/// Builds a Flat index, writing its handle through `handle` on success.
#[no_mangle]
pub unsafe extern "C" fn annix_new_flat(handle: *mut u64, err_msg: *mut *mut c_char, num_features: c_int) -> c_int {
    guard(err_msg, || {
        let idx = new_index(num_features as usize, Flavor::Flat)?;
        if !handle.is_null() {
            *handle = register(idx);
        }
        Ok(())
    })
}

/// Builds a PQ index, writing its handle through `handle` on success.
/// `max_iterations <= 0` or `tolerance <= 0.0` fall back to PQ's defaults.
#[no_mangle]
pub unsafe extern "C" fn annix_new_pq(
    handle: *mut u64,
    err_msg: *mut *mut c_char,
    num_features: c_int,
    num_subspaces: c_int,
    num_clusters: c_int,
    max_iterations: c_int,
    tolerance: c_float,
) -> c_int {
    guard(err_msg, || {
        let mut options = PqOptions::default();
        if max_iterations > 0 {
            options.max_iterations = max_iterations as usize;
        }
        if tolerance > 0.0 {
            options.tolerance = tolerance;
        }
        let idx = new_index(
            num_features as usize,
            Flavor::Pq {
                num_subspaces: num_subspaces as usize,
                num_clusters: num_clusters as usize,
                options,
            },
        )?;
        if !handle.is_null() {
            *handle = register(idx);
        }
        Ok(())
    })
}

/// Builds an IVF-Flat index, writing its handle through `handle` on success.
#[no_mangle]
pub unsafe extern "C" fn annix_new_ivf_flat(
    handle: *mut u64,
    err_msg: *mut *mut c_char,
    num_features: c_int,
    num_clusters: c_int,
    max_iterations: c_int,
    tolerance: c_float,
) -> c_int {
    guard(err_msg, || {
        let mut options = IvfOptions::default();
        if max_iterations > 0 {
            options.max_iterations = max_iterations as usize;
        }
        if tolerance > 0.0 {
            options.tolerance = tolerance;
        }
        let idx = new_index(
            num_features as usize,
            Flavor::IvfFlat {
                num_clusters: num_clusters as usize,
                options,
            },
        )?;
        if !handle.is_null() {
            *handle = register(idx);
        }
        Ok(())
    })
}

/// Builds an IVF-PQ index, writing its handle through `handle` on success.
#[no_mangle]
pub unsafe extern "C" fn annix_new_ivf_pq(
    handle: *mut u64,
    err_msg: *mut *mut c_char,
    num_features: c_int,
    num_clusters: c_int,
    pq_num_subspaces: c_int,
    pq_num_clusters: c_int,
    max_iterations: c_int,
    tolerance: c_float,
    pq_max_iterations: c_int,
    pq_tolerance: c_float,
) -> c_int {
    guard(err_msg, || {
        let mut pq_options = PqOptions::default();
        if pq_max_iterations > 0 {
            pq_options.max_iterations = pq_max_iterations as usize;
        }
        if pq_tolerance > 0.0 {
            pq_options.tolerance = pq_tolerance;
        }
        let mut options = IvfOptions {
            pq_options,
            ..IvfOptions::default()
        };
        if max_iterations > 0 {
            options.max_iterations = max_iterations as usize;
        }
        if tolerance > 0.0 {
            options.tolerance = tolerance;
        }
        let idx = new_index(
            num_features as usize,
            Flavor::IvfPq {
                num_clusters: num_clusters as usize,
                pq_num_subspaces: pq_num_subspaces as usize,
                pq_num_clusters: pq_num_clusters as usize,
                options,
            },
        )?;
        if !handle.is_null() {
            *handle = register(idx);
        }
        Ok(())
    })
}

/// Drops an index and removes it from the registry. A double-free or an
/// unknown handle is a silent no-op, matching `cgo.Handle.Delete`'s
/// tolerance for a handle that was already released.
#[no_mangle]
pub unsafe extern "C" fn annix_free_index(handle: u64) {
    REGISTRY.write().remove(&handle);
}

/// Frees a message previously written by any `annix_*` export through its
/// `err_msg` out-parameter. Passing `NULL` is a no-op.
#[no_mangle]
pub unsafe extern "C" fn annix_free_message(message: *mut c_char) {
    if !message.is_null() {
        drop(CString::from_raw(message));
    }
}

#[no_mangle]
pub unsafe extern "C" fn annix_train(handle: u64, err_msg: *mut *mut c_char, data: *const c_float, data_len: c_int) -> c_int {
    guard(err_msg, || {
        let mut registry = REGISTRY.write();
        let index = registry.get_mut(&handle).ok_or(crate::error::IndexError::UnknownHandle)?;
        let data = floats_from_raw(data, data_len.max(0) as usize);
        index.train(&data)
    })
}

#[no_mangle]
pub unsafe extern "C" fn annix_add(handle: u64, err_msg: *mut *mut c_char, data: *const c_float, data_len: c_int) -> c_int {
    guard(err_msg, || {
        let mut registry = REGISTRY.write();
        let index = registry.get_mut(&handle).ok_or(crate::error::IndexError::UnknownHandle)?;
        let data = floats_from_raw(data, data_len.max(0) as usize);
        index.add(&data)
    })
}

/// Searches `handle` for the `k` nearest neighbors of each row in `query`
/// (`query_len / num_features` rows). `out_ids`/`out_dists` must each have
/// room for `(query_len / num_features) * k` entries, row-major; rows that
/// come back with fewer than `k` hits are padded with `u64::MAX` /
/// `f32::INFINITY` so a fixed-stride caller buffer never reads
/// uninitialized memory.
#[no_mangle]
pub unsafe extern "C" fn annix_search(
    handle: u64,
    err_msg: *mut *mut c_char,
    query: *const c_float,
    query_len: c_int,
    k: c_int,
    out_ids: *mut u64,
    out_dists: *mut c_float,
) -> c_int {
    guard(err_msg, || {
        let registry = REGISTRY.read();
        let index = registry.get(&handle).ok_or(crate::error::IndexError::UnknownHandle)?;
        let query = floats_from_raw(query, query_len.max(0) as usize);
        let k = k as usize;
        let (ids, dists) = index.search(&query, k)?;

        if !out_ids.is_null() && !out_dists.is_null() {
            for (row, (row_ids, row_dists)) in ids.iter().zip(dists.iter()).enumerate() {
                for col in 0..k {
                    let slot = row * k + col;
                    if col < row_ids.len() {
                        *out_ids.add(slot) = row_ids[col];
                        *out_dists.add(slot) = row_dists[col];
                    } else {
                        *out_ids.add(slot) = u64::MAX;
                        *out_dists.add(slot) = f32::INFINITY;
                    }
                }
            }
        }
        Ok(())
    })
}

#[no_mangle]
pub unsafe extern "C" fn annix_num_vectors(handle: u64) -> c_int {
    REGISTRY
        .read()
        .get(&handle)
        .map(|idx| idx.num_vectors() as c_int)
        .unwrap_or(-1)
}

#[no_mangle]
pub unsafe extern "C" fn annix_save(handle: u64, err_msg: *mut *mut c_char, path: *const c_char) -> c_int {
    guard(err_msg, || {
        let registry = REGISTRY.read();
        let index = registry.get(&handle).ok_or(crate::error::IndexError::UnknownHandle)?;
        let path = CStr::from_ptr(path).to_string_lossy().into_owned();
        let file = std::fs::File::create(path)?;
        crate::persistence::save(index.as_ref(), file)
    })
}

#[no_mangle]
pub unsafe extern "C" fn annix_load(handle: *mut u64, err_msg: *mut *mut c_char, path: *const c_char) -> c_int {
    guard(err_msg, || {
        let path = CStr::from_ptr(path).to_string_lossy().into_owned();
        let file = std::fs::File::open(path)?;
        let idx = crate::persistence::load(file)?;
        if !handle.is_null() {
            *handle = register(idx);
        }
        Ok(())
    })
}
