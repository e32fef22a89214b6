pub mod client_info;
pub mod db_utils;
pub mod ip_filter;
pub mod response;
pub mod time_utils;
