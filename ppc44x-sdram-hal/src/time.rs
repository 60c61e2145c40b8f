//! # Time units

/// Hertz
pub type Hertz = fugit::HertzU32;
pub type Hz = Hertz;

/// MegaHertz
pub type MegaHertz = fugit::MegahertzU32;
pub type MHz = MegaHertz;
