pub mod datagen;
pub mod deviation;
pub mod divector;
pub mod fieldsummarizer;
pub mod rangevector;
pub mod samplesummary;
