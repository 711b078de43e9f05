use memmap2::MmapOptions;
use safetensors::tensor::TensorView;
use safetensors::{Dtype, SafeTensors};
use std::fs::File;
use std::path::Path;
use tch::{nn, Device, Kind, Tensor};

use crate::error::{CoreError, Result};

/// Writes every variable of `vs` as little-endian f32 into a safetensors file.
pub fn save_safetensors<P: AsRef<Path>>(vs: &nn::VarStore, path: P) -> Result<()> {
    let mut buffers: Vec<(String, Vec<usize>, Vec<u8>)> = Vec::new();

    for (name, var) in vs.variables() {
        let tensor = var.to_device(Device::Cpu).to_kind(Kind::Float).contiguous();
        let shape: Vec<usize> = tensor.size().iter().map(|&d| d as usize).collect();
        let values = Vec::<f32>::try_from(&tensor.flatten(0, -1))?;
        let bytes = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        buffers.push((name, shape, bytes));
    }

    let mut views = Vec::with_capacity(buffers.len());
    for (name, shape, bytes) in &buffers {
        views.push((name.as_str(), TensorView::new(Dtype::F32, shape.clone(), bytes)?));
    }

    safetensors::serialize_to_file(views, &None, path.as_ref())?;
    Ok(())
}

/// Copies tensors from a safetensors file into the matching variables of `vs`.
/// Returns the number of variables restored.
pub fn load_safetensors<P: AsRef<Path>>(vs: &mut nn::VarStore, path: P) -> Result<usize> {
    let file = File::open(path)?;
    let buffer = unsafe { MmapOptions::new().map(&file)? };
    let tensors = SafeTensors::deserialize(&buffer)?;

    let mut variables = vs.variables();
    let device = vs.device();
    let mut restored = 0;

    for (name, view) in tensors.tensors() {
        let Some(var) = variables.get_mut(&name) else {
            log::warn!("tensor {name} found in safetensors but not in model");
            continue;
        };

        let shape: Vec<i64> = view.shape().iter().map(|&x| x as i64).collect();
        let kind = match view.dtype() {
            Dtype::F32 => Kind::Float,
            Dtype::F16 => Kind::Half,
            Dtype::BF16 => Kind::BFloat16,
            other => return Err(CoreError::UnsupportedDtype(format!("{other:?}"))),
        };

        let tch_tensor = Tensor::from_data_size(view.data(), &shape, kind)
            .to_kind(var.kind())
            .to_device(device);

        tch::no_grad(|| {
            var.copy_(&tch_tensor);
        });
        restored += 1;
    }

    Ok(restored)
}
