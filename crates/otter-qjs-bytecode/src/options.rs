//! Codec configuration

/// Options shared by [`crate::Decoder`] and [`crate::Encoder`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecOptions {
    /// Accept the FunctionBytecode tag
    pub allow_bytecode: bool,
    /// Maximum function nesting depth through constant pools
    pub max_depth: usize,
    /// Reject encodings that would not re-encode to identical bytes
    pub strict: bool,
    /// Use the opposite of host byte order for fixed-width fields
    pub byte_swap: bool,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            allow_bytecode: true,
            max_depth: 256,
            strict: true,
            byte_swap: false,
        }
    }
}

impl CodecOptions {
    /// Create options with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether function bytecode is accepted
    pub fn allow_bytecode(mut self, allow: bool) -> Self {
        self.allow_bytecode = allow;
        self
    }

    /// Set maximum function nesting depth
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Set strict canonical-form checking
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Set byte swapping for u16 and f64 fields
    pub fn byte_swap(mut self, swap: bool) -> Self {
        self.byte_swap = swap;
        self
    }

    /// Options that accept anything the native reader would
    pub fn lenient() -> Self {
        Self::default().strict(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = CodecOptions::default();
        assert!(options.allow_bytecode);
        assert!(options.strict);
        assert!(!options.byte_swap);
        assert_eq!(options.max_depth, 256);
    }

    #[test]
    fn test_builder() {
        let options = CodecOptions::new().allow_bytecode(false).max_depth(4).byte_swap(true);
        assert!(!options.allow_bytecode);
        assert_eq!(options.max_depth, 4);
        assert!(options.byte_swap);
        assert!(!CodecOptions::lenient().strict);
    }
}
