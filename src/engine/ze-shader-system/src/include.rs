use crate::Error;
use ze_filesystem::path::Path;
use ze_filesystem::FileSystem;

const INCLUDE_DIRECTIVE: &str = "#include";

/// Opens text resources by name inside a resource group
pub trait ResourceLookup: Send + Sync {
    fn open_resource(&self, name: &str, group: &str) -> Result<String, ze_filesystem::Error>;
}

/// Groups are mount point aliases
impl ResourceLookup for FileSystem {
    fn open_resource(&self, name: &str, group: &str) -> Result<String, ze_filesystem::Error> {
        let path = Path::from_mount_point_and_path(group, name)
            .map_err(|_| ze_filesystem::Error::UnknownMountPoint)?;
        self.read_to_string(&path)
    }
}

/// Inlines `#include "file"` and `#include <file>` directives
///
/// Every inlined file is surrounded by `#line` markers so compiler diagnostics point at the
/// right file and line. Included files are resolved recursively.
pub struct IncludeResolver<'a> {
    lookup: &'a dyn ResourceLookup,
    group: &'a str,
    stack: Vec<String>,
}

impl<'a> IncludeResolver<'a> {
    pub fn new(lookup: &'a dyn ResourceLookup, group: &'a str) -> Self {
        Self {
            lookup,
            group,
            stack: vec![],
        }
    }

    pub fn resolve(&mut self, source: &str, file_name: &str) -> Result<String, Error> {
        self.stack.push(file_name.to_string());
        let result = self.resolve_source(source, file_name);
        self.stack.pop();
        result
    }

    fn resolve_source(&mut self, source: &str, file_name: &str) -> Result<String, Error> {
        let mut output = String::with_capacity(source.len());
        let mut start_marker = 0;
        let mut search_from = 0;

        while let Some(offset) = source[search_from..].find(INCLUDE_DIRECTIVE) {
            let include_pos = search_from + offset;
            let after_include = include_pos + INCLUDE_DIRECTIVE.len();
            let before = &source[..include_pos];
            let new_line_before = before.rfind('\n');

            if is_commented(before, new_line_before) {
                search_from = after_include;
                continue;
            }

            let new_line_after = source[after_include..]
                .find('\n')
                .map(|offset| after_include + offset);
            let line = &source[after_include..new_line_after.unwrap_or(source.len())];

            let (name_start, closing) = if let Some(offset) = line.find('"') {
                (after_include + offset + 1, '"')
            } else if let Some(offset) = line.find('<') {
                (after_include + offset + 1, '>')
            } else {
                return Err(Error::MalformedDirective {
                    file: file_name.to_string(),
                    expected: "\" or <",
                });
            };

            let name_end = source[name_start..]
                .find(closing)
                .map(|offset| name_start + offset)
                .ok_or_else(|| Error::MalformedDirective {
                    file: file_name.to_string(),
                    expected: if closing == '"' { "\"" } else { ">" },
                })?;
            let include_name = &source[name_start..name_end];

            if self.stack.iter().any(|file| file == include_name) {
                return Err(Error::RecursiveInclude(include_name.to_string()));
            }

            let included = self
                .lookup
                .open_resource(include_name, self.group)
                .map_err(|source| Error::Resource {
                    name: include_name.to_string(),
                    group: self.group.to_string(),
                    source,
                })?;
            let included = self.resolve(&included, include_name)?;

            // Keep everything up to the line holding the directive
            if let Some(new_line_before) = new_line_before {
                if new_line_before >= start_marker {
                    output.push_str(&source[start_marker..=new_line_before]);
                }
            }

            let include_line = before.matches('\n').count() + 1;
            output.push_str(&format!("#line 1 \"{}\"\n", include_name));
            output.push_str(&included);
            output.push_str(&format!("\n#line {} \"{}\"\n", include_line, file_name));

            match new_line_after {
                Some(new_line_after) => {
                    start_marker = new_line_after;
                    search_from = new_line_after;
                }
                None => {
                    start_marker = source.len();
                    break;
                }
            }
        }

        output.push_str(&source[start_marker..]);
        Ok(output)
    }
}

/// Textual check: a `//` after the last newline, or a `/*` without a matching `*/`
fn is_commented(before: &str, new_line_before: Option<usize>) -> bool {
    if let Some(line_comment) = before.rfind("//") {
        if new_line_before.map_or(true, |new_line| line_comment > new_line) {
            return true;
        }
    }

    if let Some(block_open) = before.rfind("/*") {
        if before
            .rfind("*/")
            .map_or(true, |block_close| block_close < block_open)
        {
            return true;
        }
    }

    false
}
