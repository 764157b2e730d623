pub mod txt;
pub mod xml;
