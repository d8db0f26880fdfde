use ocl::{Context, Device, Platform};

use station_core::StationError;

/// Platform/device enumeration and context creation, following the
/// `Platform::default()` / `Device::first()` / `Context::builder()` idiom.
/// Built only with the `opencl` feature, since it requires a system ICD
/// loader at runtime.
pub struct OpenClContext {
    context: Context,
    platform_name: String,
    device_name: String,
}

impl OpenClContext {
    /// Creates a context on the default platform's first device.
    pub fn create() -> Result<Self, StationError> {
        let platform = Platform::default();
        let device = Device::first(platform)
            .map_err(|e| StationError::OpenClError(format!("no OpenCL device found: {e}")))?;

        let context = Context::builder()
            .platform(platform)
            .devices(device)
            .build()
            .map_err(|e| StationError::OpenClError(format!("context creation failed: {e}")))?;

        let platform_name = platform
            .name()
            .unwrap_or_else(|_| "<unknown platform>".to_string());
        let device_name = device
            .name()
            .unwrap_or_else(|_| "<unknown device>".to_string());

        tracing::info!(platform = %platform_name, device = %device_name, "OpenCL context created");

        Ok(Self {
            context,
            platform_name,
            device_name,
        })
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn platform_name(&self) -> &str {
        &self.platform_name
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // No ICD loader is guaranteed to be present in CI; this only checks
    // that a missing platform surfaces as `OpenClError`, not a panic.
    #[test]
    fn create_never_panics_without_a_platform() {
        let _ = OpenClContext::create();
    }
}
