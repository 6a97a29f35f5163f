pub mod cancel;
pub mod extractor;
pub mod job_runner;
pub mod orchestrator;
pub mod page_processor;
pub mod progress;
pub mod reassembler;
pub mod strategy;
pub mod supervisor;
