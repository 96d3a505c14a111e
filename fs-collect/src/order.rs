use data_offer::{ContentKind, FileRecord};

use crate::graph::UnitGraph;

/// Arrange `files` for definition on the requesting side: plain files
/// first, then archives, then units, where a unit never precedes one it
/// depends on.
pub fn order_for_definition(files: &mut Vec<FileRecord>, graph: &UnitGraph) {
    let mut plain = Vec::new();
    let mut archives = Vec::new();
    let mut units = Vec::new();
    for file in files.drain(..) {
        match file.kind {
            ContentKind::ReadonlyFile => plain.push(file),
            ContentKind::Jar => archives.push(file),
            ContentKind::Class => units.push(file),
        }
    }

    // Units are mostly incomparable, so a sort does not apply. Swap every
    // violating pair and rescan from the same position.
    let limit = units.len() * units.len() + 1;
    let mut swaps = 0;
    let mut cur = 0;
    while cur < units.len() {
        let conflict = (cur + 1..units.len())
            .find(|&next| graph.depends_on(&units[cur].name, &units[next].name));
        match conflict {
            Some(next) if swaps < limit => {
                units.swap(cur, next);
                swaps += 1;
            }
            Some(_) => {
                log::warn!(
                    "collect: cyclic dependency around {}, keeping order",
                    units[cur].name
                );
                cur += 1;
            }
            None => cur += 1,
        }
    }

    files.extend(plain);
    files.extend(archives);
    files.extend(units);
}
