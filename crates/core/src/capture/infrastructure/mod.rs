pub mod image_directory_source;
