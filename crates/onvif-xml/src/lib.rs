//! XML plumbing for ONVIF SOAP messages: a namespace-aware writer and read helpers
//! over `roxmltree`.

pub mod builder;
pub mod parser;

pub use quick_xml::escape;
