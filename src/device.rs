use crate::{Error, Result};
use ocl::enums::{DeviceInfo, DeviceInfoResult};
use ocl::{Device, Platform};

/// One probed OpenCL device plus the figures the miner cares about.
pub struct PickedDevice {
    pub platform: Platform,
    pub device: Device,
    pub max_compute_units: u32,
    score: f64,
}

/// Cheap check used to decide whether the GPU engine is worth trying at
/// all. Any probing error counts as "no".
pub fn gpus_available() -> bool {
    Platform::list()
        .iter()
        .any(|p| matches!(Device::list_all(p), Ok(devs) if !devs.is_empty()))
}

/// Enumerates every device on every platform and picks the one with the
/// highest score (global memory x compute units x workgroup size).
pub fn best_device() -> Result<PickedDevice> {
    let platforms = Platform::list();
    if platforms.is_empty() {
        return Err(Error::Device("no OpenCL hardware found".into()));
    }
    let mut best: Option<PickedDevice> = None;
    for platform in platforms {
        let devices = Device::list_all(platform)?;
        for device in devices {
            let probed = probe(platform, device)?;
            if best.as_ref().map_or(true, |b| probed.score > b.score) {
                best = Some(probed);
            }
        }
    }
    best.ok_or_else(|| Error::Device("no usable OpenCL device".into()))
}

fn probe(platform: Platform, device: Device) -> Result<PickedDevice> {
    let mem = info_u64(&device, DeviceInfo::GlobalMemSize)?;
    let max_cu = info_u32(&device, DeviceInfo::MaxComputeUnits)?;
    let max_wg = info_u64(&device, DeviceInfo::MaxWorkGroupSize)?;
    let score = (mem / 1048576) as f64 * max_cu as f64 * max_wg as f64;
    Ok(PickedDevice {
        platform,
        device,
        max_compute_units: max_cu,
        score,
    })
}

/// Describes the device on stderr, one line, same shape the progress
/// output uses.
pub fn dump_device(picked: &PickedDevice) -> Result<()> {
    let dev = &picked.device;
    let mem = info_u64(dev, DeviceInfo::GlobalMemSize)?;
    let local = info_u64(dev, DeviceInfo::LocalMemSize)?;
    let max_wg = info_u64(dev, DeviceInfo::MaxWorkGroupSize)?;
    eprintln!(
        "  {}: {:6.1}GB / {}KB. CU={} WG={} (v{})",
        dev.name()?,
        mem as f64 / 1048576.0 / 1024.0,
        local / 1024,
        picked.max_compute_units,
        max_wg,
        dev.info(DeviceInfo::DriverVersion)?
    );
    Ok(())
}

/// NVIDIA's compiler takes extra flags; everyone else gets none.
pub fn compiler_options(device: &Device) -> Result<&'static str> {
    let vendor = device.vendor()?;
    if vendor.contains("NVIDIA") {
        Ok("-cl-nv-verbose -cl-nv-maxrregcount=128")
    } else {
        Ok("")
    }
}

fn info_u32(device: &Device, field: DeviceInfo) -> Result<u32> {
    match device.info(field)? {
        DeviceInfoResult::MaxComputeUnits(n) => Ok(n),
        other => Err(Error::Bug(format!("unexpected device info: {}", other))),
    }
}

fn info_u64(device: &Device, field: DeviceInfo) -> Result<u64> {
    match device.info(field)? {
        DeviceInfoResult::GlobalMemSize(n) => Ok(n),
        DeviceInfoResult::LocalMemSize(n) => Ok(n),
        DeviceInfoResult::MaxWorkGroupSize(n) => Ok(n as u64),
        other => Err(Error::Bug(format!("unexpected device info: {}", other))),
    }
}
