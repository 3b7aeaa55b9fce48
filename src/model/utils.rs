use lazy_static::lazy_static;
use tch::{Device, Kind, Tensor};
use tracing::{debug, enabled, Level};

lazy_static! {
    pub static ref DEVICE: Device = Device::cuda_if_available();
}

/// Seeds libtorch's generator so parameter initialization and dropout masks are reproducible.
pub fn seed_everything(seed: u64) {
    tch::manual_seed(seed as i64);
}

pub fn log_tensor_stats(tensor: &Tensor, message: &str) {
    // Every statistic forces a device sync
    if !enabled!(Level::DEBUG) {
        return;
    }
    debug!(
        label = message,
        shape = ?tensor.size(),
        mean = tensor.mean(Kind::Float).double_value(&[]),
        std = tensor.std(true).double_value(&[]),
        max = tensor.max().double_value(&[]),
        min = tensor.min().double_value(&[]),
        "tensor stats"
    );
}
