use super::test_helpers::*;
use super::*;
use crate::error::FetchError;
use crate::types::DownloadState;
