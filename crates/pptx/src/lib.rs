//! PPTX (Office Open XML) output for generated decks.
//!
//! A package is a ZIP archive of XML parts. [`PptxWriter`] lays out each
//! slide from its content blocks and the deck template's style, embeds
//! rendered images and writes speaker notes as notes slides.
//! [`PptxReader`] reads the slide text back.

pub mod parts;
pub mod reader;
pub mod slide;
pub mod writer;
pub mod xml;

pub use reader::{PptxReader, SlideText};
pub use writer::PptxWriter;
