pub mod bonbanh;
pub mod chotot;
pub mod otoanhluong;
pub mod xeluottoantrung;

pub use bonbanh::BonbanhSource;
pub use chotot::ChototSource;
pub use otoanhluong::OtoAnhLuongSource;
pub use xeluottoantrung::XeLuotToanTrungSource;
