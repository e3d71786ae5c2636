/// Failure modes the driver and kernels can report (§7).
///
/// Capacity exhaustion is recoverable by the caller (re-chunk or re-allocate
/// larger); everything else is fatal to the current solve. No `Display`
/// impl: call sites format with `{:?}`, matching the rest of this stack.
#[derive(Debug)]
pub enum Error {
    /// A collaborator handed the engine a malformed formula or decomposition.
    InvalidInput(String),
    /// A trie exceeded its preallocated node capacity, or a bag's
    /// assignment space exceeded `maxBag`.
    CapacityExhausted { bag_id: u32, needed: u64, allocated: u64 },
    /// A kernel launch or device synchronisation failed.
    DeviceFault(String),
    /// The exponent correction path was applied and the bag still produced
    /// magnitudes outside safe `f64` range.
    NumericOverflow { bag_id: u32 },
    /// No adapter matching the requested backends was found.
    NoAdapter,
    DeviceRequest(wgpu::RequestDeviceError),
}

impl From<wgpu::RequestDeviceError> for Error {
    fn from(err: wgpu::RequestDeviceError) -> Self {
        Error::DeviceRequest(err)
    }
}
