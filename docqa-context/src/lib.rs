pub mod assembly;
pub mod text;

// Re-export the chunking and assembly entry points for external use
pub use assembly::{
    AssembledContext, AssemblyError, AssemblyStrategy, ContextAssembler, STUFF_PROMPT_TEMPLATE,
    StuffAssembler, render_prompt,
};
pub use text::{
    ChunkError, DEFAULT_BOUNDARIES, DEFAULT_BOUNDARY_LOOKBACK, TextSpan, TextSplitter, split,
};
