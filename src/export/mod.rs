pub mod html_overlay_export;
pub mod json_export;
pub mod table_export;
pub mod text_export;

use anyhow::Result;

pub use html_overlay_export::{DetectionOverlay, HtmlOverlayExporter};
pub use json_export::JsonExporter;
pub use table_export::TableExporter;
pub use text_export::TextExporter;

pub trait Exporter<T: ?Sized> {
    fn export(&self, item: &T) -> Result<()>;
}
