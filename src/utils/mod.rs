pub mod brand;
pub mod error;
pub mod json;
pub mod text;
