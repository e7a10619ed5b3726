//! Raw bindings for the subset of `ncnn/c_api.h` used by the face model.

use std::os::raw::{c_char, c_float, c_int, c_void};

pub type NcnnNetT = *mut c_void;
pub type NcnnExtractorT = *mut c_void;
pub type NcnnMatT = *mut c_void;
pub type NcnnOptionT = *mut c_void;

#[link(name = "ncnn")]
unsafe extern "C" {
    pub fn ncnn_net_create() -> NcnnNetT;
    pub fn ncnn_net_destroy(net: NcnnNetT);
    pub fn ncnn_net_set_option(net: NcnnNetT, opt: NcnnOptionT);
    pub fn ncnn_net_load_param(net: NcnnNetT, path: *const c_char) -> c_int;
    pub fn ncnn_net_load_model(net: NcnnNetT, path: *const c_char) -> c_int;

    pub fn ncnn_extractor_create(net: NcnnNetT) -> NcnnExtractorT;
    pub fn ncnn_extractor_destroy(ex: NcnnExtractorT);
    pub fn ncnn_extractor_input(ex: NcnnExtractorT, name: *const c_char, mat: NcnnMatT) -> c_int;
    pub fn ncnn_extractor_extract(ex: NcnnExtractorT, name: *const c_char, mat: *mut NcnnMatT) -> c_int;

    pub fn ncnn_mat_create_external_3d(w: c_int, h: c_int, c: c_int, data: *mut c_void, allocator: *mut c_void) -> NcnnMatT;
    pub fn ncnn_mat_destroy(mat: NcnnMatT);
    pub fn ncnn_mat_get_w(mat: NcnnMatT) -> c_int;
    pub fn ncnn_mat_get_h(mat: NcnnMatT) -> c_int;
    pub fn ncnn_mat_get_c(mat: NcnnMatT) -> c_int;
    pub fn ncnn_mat_get_data(mat: NcnnMatT) -> *const c_float;

    pub fn ncnn_option_create() -> NcnnOptionT;
    pub fn ncnn_option_destroy(opt: NcnnOptionT);
    pub fn ncnn_option_set_use_fp16_packed(opt: NcnnOptionT, enabled: c_int);
    pub fn ncnn_option_set_use_fp16_storage(opt: NcnnOptionT, enabled: c_int);
    pub fn ncnn_option_set_use_fp16_arithmetic(opt: NcnnOptionT, enabled: c_int);
    pub fn ncnn_option_set_num_threads(opt: NcnnOptionT, n: c_int);
}
