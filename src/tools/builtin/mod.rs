// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Builtin tool implementations
//!
//! Each network-backed tool owns a reqwest client with an explicit timeout;
//! handlers return `{"error": ...}` payloads for expected failures so the
//! model can react instead of the conversation aborting.

pub mod draw;
pub mod search;
pub mod time;
pub mod weather;
pub mod web;
