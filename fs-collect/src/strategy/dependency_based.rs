use std::collections::HashSet;
use std::sync::Arc;

use data_error::Result;
use data_offer::{FileRecord, Offer};

use super::CollectionStrategy;
use crate::catalog::UnitLocation;
use crate::context::{dedup_files, CollectContext};

/// Offers the physical file of the unit plus every unit of the same
/// origin it references (supertypes, nested units, field types), each
/// with its own declared files. A unit found inside an archive has no
/// closure to walk, so its offer is the archive plus the unit's own
/// declared files.
pub struct DependencyBasedStrategy {
    context: Arc<CollectContext>,
}

impl DependencyBasedStrategy {
    pub fn new(context: Arc<CollectContext>) -> Self {
        DependencyBasedStrategy { context }
    }

    /// Depth-first closure starting at `unit`, in discovery order.
    fn closure(&self, unit: &str) -> Vec<String> {
        let graph = self.context.graph();
        let mut seen = HashSet::new();
        let mut collected = Vec::new();
        let mut stack = vec![unit.to_owned()];

        while let Some(current) = stack.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            collected.push(current.clone());

            let Some(info) = graph.get(&current) else {
                continue;
            };
            let related = |other: &&String| {
                !graph.is_platform(other) && graph.same_origin(&current, other)
            };
            // Reverse so the first listed relation is visited first.
            let mut next: Vec<&String> = Vec::new();
            next.extend(info.supertypes.iter().filter(related));
            next.extend(info.nested.iter());
            next.extend(info.field_types.iter().filter(related));
            stack.extend(next.into_iter().rev().cloned());
        }
        collected
    }
}

impl CollectionStrategy for DependencyBasedStrategy {
    fn label(&self) -> &str {
        "dependency-based"
    }

    fn context(&self) -> &CollectContext {
        &self.context
    }

    fn collect(&self, unit: &str) -> Result<Option<Offer>> {
        let ctx = &self.context;
        let Some(location) = ctx.classpath().locate(unit) else {
            return ctx.resource_offer(unit, self.label());
        };

        let mut files: Vec<FileRecord> = Vec::new();
        let mut units_with_files: Vec<String> = Vec::new();

        if location.is_archive() {
            files.push(ctx.physical_record(unit, &location)?);
            if let Some(required) = ctx.dependent_files(unit)? {
                files.extend(required);
                units_with_files.push(unit.to_owned());
            }
        } else {
            for member in self.closure(unit) {
                let record = if member == unit {
                    ctx.physical_record(unit, &location)?
                } else {
                    match ctx.classpath().locate(&member) {
                        Some(
                            found @ UnitLocation::Directory { .. },
                        ) => ctx.physical_record(&member, &found)?,
                        // Units living in archives are not pulled in.
                        Some(UnitLocation::Archive { .. }) | None => {
                            log::debug!(
                                "collect/dependency-based: skipping {}",
                                member
                            );
                            continue;
                        }
                    }
                };
                files.push(record);

                if let Some(required) = ctx.dependent_files(&member)? {
                    files.extend(required);
                    units_with_files.push(member);
                }
            }
        }

        let mut files = dedup_files(files);
        ctx.order_for_definition(&mut files);

        let mut offer = Offer::new(files);
        offer.merge_units_with_files(&units_with_files);
        Ok(Some(offer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marker::DependencyMarker;
    use crate::test_utils::Fixture;
    use data_offer::ContentKind;

    fn names(offer: &Offer) -> Vec<&str> {
        offer.files().iter().map(|f| f.name.as_str()).collect()
    }

    fn fixture() -> Fixture {
        let fixture = Fixture::new();
        for unit in ["a.Base", "a.Foo", "a.Foo$Inner", "a.Field", "b.Other"] {
            fixture.class(unit, unit.as_bytes());
        }
        fixture.file("base.txt", b"base");
        fixture.file("field.txt", b"field");

        fixture.unit("a.Base", |u| {
            u.with_marker(DependencyMarker::Files(vec!["base.txt".into()]))
        });
        fixture.unit("a.Foo", |u| {
            u.extends("a.Base")
                .extends("java.lang.Runnable")
                .with_nested("a.Foo$Inner")
                .with_field("a.Field")
                .with_field("b.Other")
        });
        fixture.unit("a.Foo$Inner", |u| u.enclosed_by("a.Foo"));
        fixture.unit("a.Field", |u| {
            u.with_marker(DependencyMarker::Files(vec![
                "field.txt".into(),
                "base.txt".into(),
            ]))
        });
        fixture.unit("b.Other", |u| u.in_module("other"));
        fixture.unit("java.lang.Runnable", |u| u.platform());
        fixture
    }

    #[test]
    fn same_origin_closure_with_declared_files() {
        let fixture = fixture();
        let strategy = DependencyBasedStrategy::new(fixture.context());
        let offer = strategy.collect("a.Foo").unwrap().unwrap();

        let names = names(&offer);
        assert_eq!(names.len(), 6);
        assert_eq!(&names[..2], &["base.txt", "field.txt"]);
        assert!(!names.contains(&"b.Other"));
        assert!(!names.contains(&"java.lang.Runnable"));

        let pos = |n| names.iter().position(|x| *x == n).unwrap();
        assert!(pos("a.Base") < pos("a.Foo"));
        assert!(pos("a.Base") < pos("a.Foo$Inner"));
        assert!(offer
            .files()
            .iter()
            .all(|f| f.kind != ContentKind::Jar && !f.has_content()));

        let mut units = offer.units_with_files.clone();
        units.sort();
        assert_eq!(units, vec!["a.Base", "a.Field"]);
    }

    #[test]
    fn archived_unit_ships_archive_and_own_files() {
        let fixture = fixture();
        fixture.jar("lib.jar", &[("c.Jarred", b"j")]);
        fixture.unit("c.Jarred", |u| {
            u.extends("a.Base")
                .with_marker(DependencyMarker::Files(vec!["field.txt".into()]))
        });

        let strategy = DependencyBasedStrategy::new(fixture.context());
        let offer = strategy.collect("c.Jarred").unwrap().unwrap();
        assert_eq!(names(&offer), vec!["field.txt", "lib.jar"]);
        assert_eq!(offer.units_with_files, vec!["c.Jarred"]);
    }

    #[test]
    fn units_in_archives_are_not_pulled_into_a_closure() {
        let fixture = Fixture::new();
        fixture.class("a.Foo", b"foo");
        fixture.jar("lib.jar", &[("a.Dep", b"dep")]);
        fixture.unit("a.Foo", |u| u.with_field("a.Dep"));
        fixture.unit("a.Dep", |u| u);

        let strategy = DependencyBasedStrategy::new(fixture.context());
        let offer = strategy.collect("a.Foo").unwrap().unwrap();
        assert_eq!(names(&offer), vec!["a.Foo"]);
    }
}
