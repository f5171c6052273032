// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

pub mod camera;
pub mod capture;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod layout;
pub mod logging;
pub mod orchestrator;
pub mod playlist;
pub mod schedule;
pub mod source;
