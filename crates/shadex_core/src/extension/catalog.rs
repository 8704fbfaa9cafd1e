//! Initializer catalog: keywords the module understands and what they build.
//!
//! # Responsibility
//! - Enumerate initializer descriptors by index in a stable order.
//! - Resolve `(index, keyword)` pairs coming back from the host parser.
//!
//! # Invariants
//! - Indices are assigned in registration order and never change for one load.
//! - Keywords are unique, non-empty identifiers that fit the host name buffer.

use crate::abi::{ArgType, KindSet, ObjectKind, HOST_NAME_CAPACITY};
use crate::error::{ExtError, ExtResult};
use crate::parser::{ArgValue, ParseLimits, ParsedArgs};
use crate::render::example::{example_source, sized_example_source};
use crate::render::PixelSource;
use crate::text::copy_bounded;
use log::debug;

/// Builds the pixel source of a freshly parsed object.
pub type SourceFactory = fn(&ParsedArgs, ObjectKind) -> ExtResult<Box<dyn PixelSource>>;

/// Semantic check applied to one argument after its type matched.
pub type ArgCheck = fn(&ArgValue, &ParseLimits) -> Result<(), String>;

/// One positional argument of an initializer grammar.
#[derive(Debug, Clone, Copy)]
pub struct ArgSpec {
    pub name: &'static str,
    pub arg_type: ArgType,
    pub check: Option<ArgCheck>,
}

/// Catalog entry for one initializer keyword.
#[derive(Debug, Clone)]
pub struct InitializerDescriptor {
    pub keyword: String,
    pub kinds: KindSet,
    /// Positional grammar; empty means the keyword takes no arguments.
    pub schema: &'static [ArgSpec],
    pub factory: SourceFactory,
}

impl InitializerDescriptor {
    pub fn can_produce(&self, kind: ObjectKind) -> bool {
        self.kinds.contains(kind.as_set())
    }
}

/// What `enumerate` reports for one index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitializerInfo {
    pub kinds: KindSet,
    /// Bytes written into the caller's name buffer.
    pub name_len: usize,
}

const SIZED_SCHEMA: &[ArgSpec] = &[
    ArgSpec {
        name: "width",
        arg_type: ArgType::Int,
        check: Some(check_dimension),
    },
    ArgSpec {
        name: "height",
        arg_type: ArgType::Int,
        check: Some(check_dimension),
    },
];

fn check_dimension(value: &ArgValue, limits: &ParseLimits) -> Result<(), String> {
    match value.as_int() {
        Some(dimension) if dimension >= 1 && dimension as u32 <= limits.max_dimension => Ok(()),
        Some(dimension) => Err(format!(
            "dimension {dimension} is outside 1..={}",
            limits.max_dimension
        )),
        None => Err(format!("expected an int, got {value}")),
    }
}

/// Ordered set of initializers this module answers to.
#[derive(Debug, Clone, Default)]
pub struct InitializerCatalog {
    entries: Vec<InitializerDescriptor>,
}

impl InitializerCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog shipped with the module: `example` then `example_sized`.
    pub fn builtin() -> Self {
        Self {
            entries: vec![
                InitializerDescriptor {
                    keyword: "example".to_string(),
                    kinds: KindSet::IMAGE | KindSet::ANIMATION,
                    schema: &[],
                    factory: example_source,
                },
                InitializerDescriptor {
                    keyword: "example_sized".to_string(),
                    kinds: KindSet::IMAGE | KindSet::ANIMATION,
                    schema: SIZED_SCHEMA,
                    factory: sized_example_source,
                },
            ],
        }
    }

    /// Appends one initializer and returns its index.
    pub fn register(&mut self, descriptor: InitializerDescriptor) -> ExtResult<usize> {
        if !is_valid_keyword(&descriptor.keyword) {
            return Err(ExtError::InvalidInitializer(format!(
                "keyword `{}` is not a valid identifier",
                descriptor.keyword
            )));
        }
        if descriptor.keyword.len() > HOST_NAME_CAPACITY {
            return Err(ExtError::InvalidInitializer(format!(
                "keyword `{}` exceeds {HOST_NAME_CAPACITY} bytes",
                descriptor.keyword
            )));
        }
        if descriptor.kinds.is_empty() {
            return Err(ExtError::InvalidInitializer(format!(
                "keyword `{}` produces no object kinds",
                descriptor.keyword
            )));
        }
        if self
            .entries
            .iter()
            .any(|entry| entry.keyword == descriptor.keyword)
        {
            return Err(ExtError::InvalidInitializer(format!(
                "keyword `{}` is already registered",
                descriptor.keyword
            )));
        }

        self.entries.push(descriptor);
        Ok(self.entries.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&InitializerDescriptor> {
        self.entries.get(index)
    }

    /// Reports entry `index` and copies its keyword into `name_buf`.
    ///
    /// Returns `Ok(None)` past the last entry. A short buffer fails without
    /// writing.
    pub fn describe(&self, index: i32, name_buf: &mut [u8]) -> ExtResult<Option<InitializerInfo>> {
        let Some(entry) = usize::try_from(index).ok().and_then(|i| self.entries.get(i)) else {
            debug!("event=initializer_enumerate module=catalog status=done index={index}");
            return Ok(None);
        };

        let name_len = copy_bounded(entry.keyword.as_bytes(), name_buf)?;
        debug!(
            "event=initializer_enumerate module=catalog status=ok index={index} keyword={}",
            entry.keyword
        );
        Ok(Some(InitializerInfo {
            kinds: entry.kinds,
            name_len,
        }))
    }

    /// Resolves the `(index, keyword)` pair the host parser reports.
    pub fn lookup(&self, index: i32, keyword: &[u8]) -> ExtResult<usize> {
        usize::try_from(index)
            .ok()
            .filter(|i| {
                self.entries
                    .get(*i)
                    .is_some_and(|entry| entry.keyword.as_bytes() == keyword)
            })
            .ok_or_else(|| ExtError::UnknownInitializer {
                index,
                keyword: String::from_utf8_lossy(keyword).into_owned(),
            })
    }
}

fn is_valid_keyword(value: &str) -> bool {
    let mut chars = value.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::{InitializerCatalog, InitializerDescriptor};
    use crate::abi::KindSet;
    use crate::error::ExtError;
    use crate::render::example::example_source;

    fn descriptor(keyword: &str, kinds: KindSet) -> InitializerDescriptor {
        InitializerDescriptor {
            keyword: keyword.to_string(),
            kinds,
            schema: &[],
            factory: example_source,
        }
    }

    #[test]
    fn builtin_enumeration_is_stable_and_terminates() {
        let catalog = InitializerCatalog::builtin();
        let mut names = Vec::new();
        for index in 0.. {
            let mut buf = [0u8; 256];
            match catalog.describe(index, &mut buf).expect("describe") {
                Some(info) => {
                    assert_eq!(info.kinds, KindSet::IMAGE | KindSet::ANIMATION);
                    names.push(String::from_utf8(buf[..info.name_len].to_vec()).expect("utf8"));
                }
                None => break,
            }
        }
        assert_eq!(names, vec!["example", "example_sized"]);
    }

    #[test]
    fn negative_index_has_no_items() {
        let catalog = InitializerCatalog::builtin();
        let mut buf = [0u8; 16];
        assert_eq!(catalog.describe(-1, &mut buf).expect("describe"), None);
    }

    #[test]
    fn describe_with_short_buffer_writes_nothing() {
        let catalog = InitializerCatalog::builtin();
        let mut buf = [0xAAu8; 6];
        let err = catalog.describe(0, &mut buf).expect_err("short buffer");
        assert!(matches!(err, ExtError::BufferTooSmall { required: 7, .. }));
        assert_eq!(buf, [0xAA; 6]);
    }

    #[test]
    fn lookup_requires_matching_index_and_keyword() {
        let catalog = InitializerCatalog::builtin();
        assert_eq!(catalog.lookup(0, b"example").expect("lookup"), 0);
        assert_eq!(catalog.lookup(1, b"example_sized").expect("lookup"), 1);
        assert!(matches!(
            catalog.lookup(1, b"example"),
            Err(ExtError::UnknownInitializer { index: 1, .. })
        ));
        assert!(catalog.lookup(0, b"exam").is_err());
    }

    #[test]
    fn register_rejects_invalid_and_duplicate_keywords() {
        let mut catalog = InitializerCatalog::builtin();
        assert!(catalog
            .register(descriptor("example", KindSet::IMAGE))
            .is_err());
        assert!(catalog.register(descriptor("", KindSet::IMAGE)).is_err());
        assert!(catalog.register(descriptor("two words", KindSet::IMAGE)).is_err());
        assert!(catalog.register(descriptor("plasma", KindSet::NONE)).is_err());
        assert_eq!(
            catalog
                .register(descriptor("plasma", KindSet::ANIMATION))
                .expect("register"),
            2
        );
    }
}
