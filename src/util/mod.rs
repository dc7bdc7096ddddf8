// Copyright 2026 the GameJS authors. MIT license.

pub mod fs;
pub mod path;
