pub mod decode;
pub mod nms;

pub use decode::{
    Decoded, Detection, FLAT_STRIDE, FlatLayout, OutputLayout, RejectCounts, TensorDecoder,
    classify_flat,
};
pub use nms::suppress;
