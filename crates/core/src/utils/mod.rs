pub mod temp_id;
