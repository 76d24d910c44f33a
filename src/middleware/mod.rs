// SPDX-License-Identifier: MIT

//! Middleware modules.

pub mod auth;
pub mod security;
