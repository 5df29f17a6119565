pub mod download;
pub mod extract;
pub mod process;
pub mod search;

pub use download::{
    log_progress, DownloadInput, DownloadOutcome, DownloadProgress, PdfDownloader, ProgressCallback,
    ProgressTracker,
};
pub use extract::{ExtractInput, LopdfParser, PdfTextParser, TextExtractor};
pub use process::{PaperPipeline, PipelineRun, ProcessInput, StepOutcome};
pub use search::{SearchInput, SearchTool};
