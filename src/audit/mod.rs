pub mod fuzzer;
pub mod noise_filter;
pub mod prober;
pub mod risk;
pub mod route_miner;
pub mod soft404;
pub mod swagger;
pub mod tech;
pub mod waf;
pub mod wordlists;
