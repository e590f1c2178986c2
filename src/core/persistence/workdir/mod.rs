pub mod working_directory;
