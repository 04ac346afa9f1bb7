//! Shared fixtures for scenario tests
#![allow(dead_code)]

pub mod repository;
