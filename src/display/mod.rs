pub mod cover;

pub use cover::*;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatatuiImage {
    pub pixels: Vec<Vec<(u8, u8, u8)>>, // RGB values for each pixel
}
