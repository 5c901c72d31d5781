// Copyright (c) 2026 Bilinear Labs
// SPDX-License-Identifier: MIT

//! Process exit codes used by the binary.

pub const ERROR_CODE_WRONG_INPUT_ARGUMENTS: i32 = 1;
pub const ERROR_CODE_CONFIGURATION_FILE_NOT_FOUND: i32 = 2;
pub const ERROR_CODE_FAILED_TO_LOAD_CONFIGURATION_FROM_FILE: i32 = 3;
pub const ERROR_CODE_MISSING_SUBSCRIBE_CREDENTIALS: i32 = 4;
