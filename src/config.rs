/// Decode-time limits, independent of anything a CLI or host environment
/// would configure — this crate has no CLI surface, so these are the only
/// knobs a caller has.
///
/// The defaults are generous enough to accept any real-world module while
/// still bounding how much a single malformed section length can make the
/// decoder try to allocate up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderConfig {
    /// Largest permitted declared length, in bytes, for any single section.
    pub max_section_size: u32,
    /// Largest permitted number of functions (import + defined) a module may
    /// declare.
    pub max_functions: u32,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_section_size: 1 << 30, // 1 GiB
            max_functions: 1 << 20,
        }
    }
}
