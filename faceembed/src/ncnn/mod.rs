//! Minimal safe wrappers over the ncnn C API: a loaded [`Net`] and the
//! single forward pass the face model needs.

mod ffi;

use std::ffi::CString;
use std::path::Path;
use std::ptr;

use crate::EmbedError;

fn cstring(s: &str) -> Result<CString, EmbedError> {
    CString::new(s).map_err(|e| EmbedError::Model(e.to_string()))
}

/// A loaded ncnn model (.param + .bin).
pub(crate) struct Net {
    net: ffi::NcnnNetT,
    opt: ffi::NcnnOptionT,
}

// The net is read-only after load; extractors are created per call.
unsafe impl Send for Net {}

impl Net {
    /// Loads a model from disk. FP16 is disabled for numerical safety.
    pub(crate) fn from_files(param: &Path, bin: &Path, threads: usize) -> Result<Self, EmbedError> {
        let c_param = cstring(&param.to_string_lossy())?;
        let c_bin = cstring(&bin.to_string_lossy())?;

        let opt = unsafe { ffi::ncnn_option_create() };
        if opt.is_null() {
            return Err(EmbedError::Model("option_create failed".into()));
        }
        unsafe {
            ffi::ncnn_option_set_use_fp16_packed(opt, 0);
            ffi::ncnn_option_set_use_fp16_storage(opt, 0);
            ffi::ncnn_option_set_use_fp16_arithmetic(opt, 0);
            if threads > 0 {
                ffi::ncnn_option_set_num_threads(opt, threads as i32);
            }
        }

        let net = unsafe { ffi::ncnn_net_create() };
        if net.is_null() {
            unsafe { ffi::ncnn_option_destroy(opt) };
            return Err(EmbedError::Model("net_create failed".into()));
        }
        // From here on Drop releases both handles.
        let loaded = Self { net, opt };
        unsafe { ffi::ncnn_net_set_option(loaded.net, loaded.opt) };

        let ret = unsafe { ffi::ncnn_net_load_param(loaded.net, c_param.as_ptr()) };
        if ret != 0 {
            return Err(EmbedError::Model(format!("load_param {}: {ret}", param.display())));
        }
        let ret = unsafe { ffi::ncnn_net_load_model(loaded.net, c_bin.as_ptr()) };
        if ret != 0 {
            return Err(EmbedError::Model(format!("load_model {}: {ret}", bin.display())));
        }
        Ok(loaded)
    }

    /// Feeds a `c x h x w` planar tensor to `input` and returns the flattened
    /// contents of `output`.
    pub(crate) fn forward(
        &self,
        input: &str,
        output: &str,
        (w, h, c): (i32, i32, i32),
        data: &[f32],
    ) -> Result<Vec<f32>, EmbedError> {
        let required = (w * h * c) as usize;
        if data.len() < required {
            return Err(EmbedError::Model(format!(
                "input too short: got {}, need {required}",
                data.len()
            )));
        }
        let c_in = cstring(input)?;
        let c_out = cstring(output)?;

        let ex = Extractor::new(self)?;
        // ncnn borrows the buffer; it must outlive the input mat.
        let mut owned = data[..required].to_vec();
        let in_mat = Mat(unsafe {
            ffi::ncnn_mat_create_external_3d(w, h, c, owned.as_mut_ptr() as *mut _, ptr::null_mut())
        });
        if in_mat.0.is_null() {
            return Err(EmbedError::Model("mat_create_external_3d failed".into()));
        }

        let ret = unsafe { ffi::ncnn_extractor_input(ex.0, c_in.as_ptr(), in_mat.0) };
        if ret != 0 {
            return Err(EmbedError::Model(format!("extractor_input {input:?}: {ret}")));
        }

        let mut raw: ffi::NcnnMatT = ptr::null_mut();
        let ret = unsafe { ffi::ncnn_extractor_extract(ex.0, c_out.as_ptr(), &mut raw) };
        if ret != 0 || raw.is_null() {
            return Err(EmbedError::Model(format!("extractor_extract {output:?}: {ret}")));
        }
        let out_mat = Mat(raw);
        out_mat.to_vec().ok_or_else(|| EmbedError::Model("empty output".into()))
    }
}

impl Drop for Net {
    fn drop(&mut self) {
        unsafe {
            if !self.net.is_null() {
                ffi::ncnn_net_destroy(self.net);
                self.net = ptr::null_mut();
            }
            if !self.opt.is_null() {
                ffi::ncnn_option_destroy(self.opt);
                self.opt = ptr::null_mut();
            }
        }
    }
}

struct Extractor(ffi::NcnnExtractorT);

impl Extractor {
    fn new(net: &Net) -> Result<Self, EmbedError> {
        let ex = unsafe { ffi::ncnn_extractor_create(net.net) };
        if ex.is_null() {
            return Err(EmbedError::Model("extractor_create failed".into()));
        }
        Ok(Self(ex))
    }
}

impl Drop for Extractor {
    fn drop(&mut self) {
        unsafe { ffi::ncnn_extractor_destroy(self.0) };
    }
}

struct Mat(ffi::NcnnMatT);

impl Mat {
    fn to_vec(&self) -> Option<Vec<f32>> {
        let data = unsafe { ffi::ncnn_mat_get_data(self.0) };
        if data.is_null() {
            return None;
        }
        let (w, h, c) = unsafe {
            (
                ffi::ncnn_mat_get_w(self.0).max(1),
                ffi::ncnn_mat_get_h(self.0).max(1),
                ffi::ncnn_mat_get_c(self.0).max(1),
            )
        };
        let n = (w * h * c) as usize;
        let mut out = vec![0.0f32; n];
        unsafe { ptr::copy_nonoverlapping(data, out.as_mut_ptr(), n) };
        Some(out)
    }
}

impl Drop for Mat {
    fn drop(&mut self) {
        if !self.0.is_null() {
            unsafe { ffi::ncnn_mat_destroy(self.0) };
        }
    }
}
