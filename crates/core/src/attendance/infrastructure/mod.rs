pub mod csv_exporter;
