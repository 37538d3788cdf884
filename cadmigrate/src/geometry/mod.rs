pub mod trace_anchor;

pub use trace_anchor::TraceAnchor;
