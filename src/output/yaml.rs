// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

use super::{FormatOptions, OutputFormatter, QueryResult};

pub struct YamlFormatter;

impl OutputFormatter for YamlFormatter {
    fn format(result: &QueryResult, _options: &FormatOptions) -> String {
        serde_yaml::to_string(&result.records()).unwrap_or_else(|_| "[]\n".to_string())
    }
}
