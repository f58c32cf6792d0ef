//! Lookup across every packfile of an object database.

use std::fs;
use std::io;
use std::path::Path;

use super::chain::Chain;
use super::object::Object;
use super::packfile::{BaseResolver, Packfile};
use crate::config::PackConfig;
use crate::error::{PackError, Result};
use crate::objects::ObjectId;

/// A group of packfiles searched as one.
///
/// For every leading name byte the set keeps the packfiles that contain at
/// least one object with that byte, most populous first.
pub struct Set {
    packs: Vec<Packfile>,
    candidates: Vec<Vec<usize>>,
}

impl Set {
    pub fn from_packs(packs: Vec<Packfile>) -> Self {
        let candidates = (0..=255u8)
            .map(|prefix| {
                let mut order: Vec<usize> = (0..packs.len())
                    .filter(|&i| packs[i].index().prefix_count(prefix) > 0)
                    .collect();
                // stable: ties keep construction order
                order.sort_by_key(|&i| std::cmp::Reverse(packs[i].index().prefix_count(prefix)));
                order
            })
            .collect();

        tracing::debug!("built pack set over {} packfiles", packs.len());
        Set { packs, candidates }
    }

    /// Open every `pack/*.pack` under `objects_dir` that has a sibling
    /// `.idx`.
    pub fn open<P: AsRef<Path>>(objects_dir: P, config: &PackConfig) -> Result<Self> {
        let pack_dir = objects_dir.as_ref().join("pack");
        let entries = match fs::read_dir(&pack_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("no pack directory at {:?}", pack_dir);
                return Ok(Set::from_packs(Vec::new()));
            }
            Err(e) => return Err(e.into()),
        };

        let mut pack_paths = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "pack") {
                pack_paths.push(path);
            }
        }
        pack_paths.sort();

        let mut packs = Vec::with_capacity(pack_paths.len());
        for pack_path in pack_paths {
            let index_path = pack_path.with_extension("idx");
            if !index_path.is_file() {
                tracing::debug!("skipping {:?} without index", pack_path);
                continue;
            }
            match Packfile::open(&pack_path, &index_path, config) {
                Ok(pack) => packs.push(pack),
                Err(e) if config.skip_malformed_packs && is_unreadable_header(&e) => {
                    tracing::warn!("skipping malformed pack {:?}: {}", pack_path, e);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(Set::from_packs(packs))
    }

    /// Resolve `name` in the first candidate packfile that has it.
    pub fn object(&self, name: &[u8]) -> Result<Object> {
        match self.find(name, None) {
            Err(PackError::NotFound) => Err(PackError::NoSuchObject(ObjectId::from_bytes(name).to_hex())),
            other => other.map(Object::new),
        }
    }

    /// Whether any packfile indexes `name`, without reading the object.
    pub fn contains(&self, name: &[u8]) -> Result<bool> {
        let Some(&prefix) = name.first() else {
            return Err(PackError::InvalidName("empty object name".to_string()));
        };
        for pack in self.candidates(prefix) {
            match pack.index().entry(name) {
                Ok(_) => return Ok(true),
                Err(PackError::NotFound) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(false)
    }

    /// Packfiles that may contain names beginning with `prefix`, in the order
    /// they are searched.
    pub fn candidates(&self, prefix: u8) -> impl Iterator<Item = &Packfile> + '_ {
        self.candidates
            .get(prefix as usize)
            .into_iter()
            .flatten()
            .map(move |&i| &self.packs[i])
    }

    pub fn packs(&self) -> &[Packfile] {
        &self.packs
    }

    pub fn len(&self) -> usize {
        self.packs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packs.is_empty()
    }

    /// Close every packfile, returning the first error. Later calls are
    /// no-ops.
    pub fn close(&mut self) -> Result<()> {
        self.candidates.clear();
        let mut first_err = None;
        for pack in self.packs.drain(..) {
            if let Err(e) = pack.close() {
                tracing::warn!("failed to close packfile: {}", e);
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Look `name` up in each candidate, continuing past packs that do not
    /// index it. `budget` caps delta hops; `None` uses each pack's own limit.
    fn find(&self, name: &[u8], budget: Option<usize>) -> Result<Chain> {
        let Some(&prefix) = name.first() else {
            return Err(PackError::InvalidName("empty object name".to_string()));
        };

        for pack in self.candidates(prefix) {
            let budget = budget.unwrap_or_else(|| pack.max_delta_depth());
            match pack.lookup(name, Some(self), budget) {
                Err(PackError::NotFound) => continue,
                other => return other,
            }
        }
        Err(PackError::NotFound)
    }
}

/// Header errors that exclude a single pack from a set, including files
/// that end before their header does.
fn is_unreadable_header(e: &PackError) -> bool {
    match e {
        PackError::Io(err) => err.kind() == io::ErrorKind::UnexpectedEof,
        _ => e.is_malformed_header(),
    }
}

impl BaseResolver for Set {
    fn resolve_base(&self, name: &[u8], budget: usize) -> Result<Chain> {
        match self.find(name, Some(budget)) {
            Err(PackError::NotFound) => Err(PackError::MissingBase(ObjectId::from_bytes(name).to_hex())),
            other => other,
        }
    }
}

impl std::fmt::Debug for Set {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Set").field("packs", &self.packs).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use gix_object::Kind;
    use proptest::prelude::*;
    use tempfile::tempdir;

    use super::*;
    use crate::objects::ObjectFormat;
    use crate::pack::fixtures::{self, name, replace_delta, PackBuilder};
    use crate::pack::index::Index;
    use crate::pack::source::ReadAt;

    /// Pack with `count` objects under prefix 0x4a; the first is always
    /// `name(0x4a, 0)` and holds `label`.
    fn pack_with(count: u8, label: &str) -> Packfile {
        let mut builder = PackBuilder::new(ObjectFormat::Sha1);
        for i in 0..count {
            let data = format!("{} {}", label, i);
            builder.base(&name(0x4a, i), Kind::Blob, data.as_bytes());
        }
        builder.base(&name(0x00, count), Kind::Blob, label.as_bytes());
        builder.packfile()
    }

    fn prefix_counts(set: &Set, prefix: u8) -> Vec<u32> {
        set.candidates(prefix)
            .map(|pack| pack.index().prefix_count(prefix))
            .collect()
    }

    #[test]
    fn test_candidates_sorted_by_prefix_count() {
        fixtures::init_tracing();
        for order in [[1u8, 2, 3], [3, 2, 1], [2, 3, 1], [1, 3, 2]] {
            let packs = order
                .iter()
                .map(|&count| pack_with(count, &format!("pack{}", count)))
                .collect();
            let set = Set::from_packs(packs);

            assert_eq!(set.len(), 3);
            assert_eq!(prefix_counts(&set, 0x4a), vec![3, 2, 1]);
            assert_eq!(prefix_counts(&set, 0x4b), Vec::<u32>::new());

            let object = set.object(&name(0x4a, 0)).unwrap();
            assert_eq!(object.unpack().unwrap(), b"pack3 0".to_vec());
        }
    }

    #[test]
    fn test_falls_through_not_found() {
        let set = Set::from_packs(vec![pack_with(3, "big"), pack_with(1, "small")]);

        // Only the largest pack has a third object.
        let object = set.object(&name(0x4a, 2)).unwrap();
        assert_eq!(object.unpack().unwrap(), b"big 2".to_vec());

        // name(0x00, 1) only lives in the small pack.
        let object = set.object(&name(0x00, 1)).unwrap();
        assert_eq!(object.unpack().unwrap(), b"small".to_vec());

        assert!(set.contains(&name(0x4a, 2)).unwrap());
        assert!(set.contains(&name(0x00, 1)).unwrap());
        assert!(!set.contains(&name(0x4a, 3)).unwrap());
    }

    #[test]
    fn test_no_such_object() {
        let set = Set::from_packs(vec![pack_with(2, "a"), pack_with(1, "b")]);

        let err = set.object(&name(0x4a, 7)).unwrap_err();
        assert!(matches!(err, PackError::NoSuchObject(ref id) if *id == hex::encode(name(0x4a, 7))));
        assert!(!err.is_not_found());

        let err = set.object(&name(0x99, 0)).unwrap_err();
        assert!(matches!(err, PackError::NoSuchObject(_)));

        assert!(matches!(set.object(&[]), Err(PackError::InvalidName(_))));
    }

    #[test]
    fn test_other_errors_propagate() {
        let mut broken = PackBuilder::new(ObjectFormat::Sha1);
        let mut object = crate::pack::varint::encode::object_header(5, 1);
        object.extend(fixtures::compress(b"x"));
        broken.raw(&name(0x4a, 0), &object);
        broken.raw(&name(0x4a, 1), &object);

        let set = Set::from_packs(vec![pack_with(1, "good"), broken.packfile()]);
        assert!(matches!(
            set.object(&name(0x4a, 0)),
            Err(PackError::UnknownObjectType(5))
        ));
    }

    #[test]
    fn test_cross_pack_ref_delta() {
        let mut bases = PackBuilder::new(ObjectFormat::Sha1);
        let base = bases.base(&name(0x01, 1), Kind::Blob, b"Hello");
        bases.ofs_delta(&name(0x01, 2), base, &replace_delta(5, b"Hello!"));
        let bases = bases.packfile();

        let mut thin = PackBuilder::new(ObjectFormat::Sha1);
        thin.ref_delta(&name(0x02, 1), &name(0x01, 2), &replace_delta(6, b"Bye!"));
        thin.ref_delta(&name(0x02, 2), &name(0x01, 9), &replace_delta(6, b"lost"));
        let thin = thin.packfile();

        assert!(matches!(
            thin.object(&name(0x02, 1)),
            Err(PackError::MissingBase(_))
        ));

        let set = Set::from_packs(vec![thin, bases]);
        let object = set.object(&name(0x02, 1)).unwrap();
        assert_eq!(object.kind(), Kind::Blob);
        assert_eq!(object.chain().depth(), 2);
        assert_eq!(object.unpack().unwrap(), b"Bye!".to_vec());

        let err = set.object(&name(0x02, 2)).unwrap_err();
        assert!(matches!(err, PackError::MissingBase(ref id) if *id == hex::encode(name(0x01, 9))));
    }

    #[test]
    fn test_cross_pack_cycle_hits_depth_guard() {
        let config = PackConfig {
            max_delta_depth: 8,
            ..PackConfig::default()
        };
        let mut a = PackBuilder::new(ObjectFormat::Sha1);
        a.ref_delta(&name(0x01, 1), &name(0x02, 1), &replace_delta(1, b"a"));
        let mut b = PackBuilder::new(ObjectFormat::Sha1);
        b.ref_delta(&name(0x02, 1), &name(0x01, 1), &replace_delta(1, b"b"));

        let set = Set::from_packs(vec![a.packfile_with(&config), b.packfile_with(&config)]);
        let err = set.object(&name(0x01, 1)).unwrap_err();
        assert!(matches!(err, PackError::DeltaChainTooDeep { max_depth: 8, .. }));
    }

    /// Pack source that records close calls and optionally fails them.
    struct CountingSource {
        bytes: Vec<u8>,
        fail_close: bool,
        closes: Arc<AtomicUsize>,
    }

    impl ReadAt for CountingSource {
        fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
            self.bytes.read_at(buf, offset)
        }

        fn close(&self) -> io::Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            if self.fail_close {
                return Err(io::Error::other("close failed"));
            }
            Ok(())
        }
    }

    fn counting_pack(label: u8, fail_close: bool, closes: &Arc<AtomicUsize>) -> Packfile {
        let mut builder = PackBuilder::new(ObjectFormat::Sha1);
        builder.base(&name(label, 0), Kind::Blob, &[label]);
        let (pack, index) = builder.finish();
        let index = Index::decode(fixtures::source(index), ObjectFormat::Sha1).unwrap();
        let source = Arc::new(CountingSource {
            bytes: pack,
            fail_close,
            closes: Arc::clone(closes),
        });
        Packfile::decode(source, index, &PackConfig::default()).unwrap()
    }

    #[test]
    fn test_close_reports_first_error_and_closes_all() {
        let closes = Arc::new(AtomicUsize::new(0));
        let mut set = Set::from_packs(vec![
            counting_pack(1, false, &closes),
            counting_pack(2, true, &closes),
            counting_pack(3, true, &closes),
        ]);

        let err = set.close().unwrap_err();
        assert!(matches!(err, PackError::Io(ref e) if e.to_string() == "close failed"));
        assert_eq!(closes.load(Ordering::SeqCst), 3);
        assert!(set.is_empty());

        set.close().unwrap();
        assert_eq!(closes.load(Ordering::SeqCst), 3);
        assert!(matches!(
            set.object(&name(1, 0)),
            Err(PackError::NoSuchObject(_))
        ));
    }

    fn write_pack(objects_dir: &Path, file_name: &str, builder: PackBuilder) {
        let (pack, index) = builder.finish();
        let pack_dir = objects_dir.join("pack");
        fs::create_dir_all(&pack_dir).unwrap();
        fs::write(pack_dir.join(format!("{}.pack", file_name)), pack).unwrap();
        fs::write(pack_dir.join(format!("{}.idx", file_name)), index).unwrap();
    }

    fn single(label: u8) -> PackBuilder {
        let mut builder = PackBuilder::new(ObjectFormat::Sha1);
        builder.base(&name(label, 0), Kind::Blob, &[label]);
        builder
    }

    #[test]
    fn test_open_discovers_packs() {
        fixtures::init_tracing();
        let dir = tempdir().unwrap();
        let objects = dir.path();

        write_pack(objects, "pack-b", single(0x0b));
        write_pack(objects, "pack-a", single(0x0a));
        // pack without index
        let (orphan, _) = single(0x0c).finish();
        fs::write(objects.join("pack").join("pack-c.pack"), orphan).unwrap();
        // malformed pack header
        write_pack(objects, "pack-d", single(0x0d));
        fs::write(objects.join("pack").join("pack-d.pack"), b"garbage").unwrap();
        fs::write(objects.join("pack").join("pack-e.keep"), b"").unwrap();

        let set = Set::open(objects, &PackConfig::default()).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.object(&name(0x0a, 0)).unwrap().unpack().unwrap(), vec![0x0a]);
        assert_eq!(set.object(&name(0x0b, 0)).unwrap().unpack().unwrap(), vec![0x0b]);
        assert!(matches!(
            set.object(&name(0x0c, 0)),
            Err(PackError::NoSuchObject(_))
        ));

        let strict = PackConfig {
            skip_malformed_packs: false,
            ..PackConfig::default()
        };
        assert!(Set::open(objects, &strict).unwrap_err().is_malformed_header());
    }

    #[test]
    fn test_open_skips_unreadable_indexes() {
        fixtures::init_tracing();
        let dir = tempdir().unwrap();
        let objects = dir.path();
        let pack_dir = objects.join("pack");

        write_pack(objects, "pack-a", single(0x0a));
        // empty index
        write_pack(objects, "pack-b", single(0x0b));
        fs::write(pack_dir.join("pack-b.idx"), b"").unwrap();
        // fanout cut short
        write_pack(objects, "pack-c", single(0x0c));
        let mut short = vec![0xff, 0x74, 0x4f, 0x63, 0, 0, 0, 2];
        short.extend_from_slice(&[0u8; 100]);
        fs::write(pack_dir.join("pack-c.idx"), short).unwrap();
        // header ends inside the version field
        write_pack(objects, "pack-d", single(0x0d));
        fs::write(pack_dir.join("pack-d.idx"), [0xff, 0x74, 0x4f, 0x63, 0, 0]).unwrap();
        // non-monotonic fanout
        write_pack(objects, "pack-e", single(0x0e));
        let index_path = pack_dir.join("pack-e.idx");
        let mut index = fs::read(&index_path).unwrap();
        index[8..12].copy_from_slice(&5u32.to_be_bytes());
        fs::write(&index_path, index).unwrap();

        let set = Set::open(objects, &PackConfig::default()).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.object(&name(0x0a, 0)).unwrap().unpack().unwrap(), vec![0x0a]);
        for label in [0x0b, 0x0c, 0x0d, 0x0e] {
            assert!(matches!(
                set.object(&name(label, 0)),
                Err(PackError::NoSuchObject(_))
            ));
        }

        let strict = PackConfig {
            skip_malformed_packs: false,
            ..PackConfig::default()
        };
        assert!(Set::open(objects, &strict).is_err());
    }

    #[test]
    fn test_open_strict_reports_empty_index() {
        let dir = tempdir().unwrap();
        write_pack(dir.path(), "pack-a", single(0x0a));
        write_pack(dir.path(), "pack-b", single(0x0b));
        fs::write(dir.path().join("pack").join("pack-b.idx"), b"").unwrap();

        assert_eq!(Set::open(dir.path(), &PackConfig::default()).unwrap().len(), 1);

        let strict = PackConfig {
            skip_malformed_packs: false,
            ..PackConfig::default()
        };
        let err = Set::open(dir.path(), &strict).unwrap_err();
        assert!(matches!(err, PackError::Io(ref e) if e.kind() == io::ErrorKind::UnexpectedEof));
    }

    #[test]
    fn test_open_propagates_unsupported_versions() {
        let dir = tempdir().unwrap();
        write_pack(dir.path(), "pack-a", single(0x0a));

        let pack_path = dir.path().join("pack").join("pack-a.pack");
        let mut pack = fs::read(&pack_path).unwrap();
        pack[4..8].copy_from_slice(&9u32.to_be_bytes());
        fs::write(&pack_path, pack).unwrap();

        assert!(matches!(
            Set::open(dir.path(), &PackConfig::default()),
            Err(PackError::UnsupportedPackVersion { got: 9 })
        ));
    }

    #[test]
    fn test_open_without_pack_dir() {
        let dir = tempdir().unwrap();
        let set = Set::open(dir.path(), &PackConfig::default()).unwrap();
        assert!(set.is_empty());
        assert!(matches!(
            set.object(&name(0x01, 0)),
            Err(PackError::NoSuchObject(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_candidates_stable_descending(counts in prop::collection::vec(0u8..5, 1..6)) {
            let packs = counts
                .iter()
                .enumerate()
                .map(|(i, &count)| pack_with(count, &format!("p{}", i)))
                .collect();
            let set = Set::from_packs(packs);

            let mut expected: Vec<(usize, u32)> = counts
                .iter()
                .enumerate()
                .filter(|(_, &count)| count > 0)
                .map(|(i, &count)| (i, u32::from(count)))
                .collect();
            expected.sort_by_key(|&(_, count)| std::cmp::Reverse(count));

            let actual: Vec<(usize, u32)> = set
                .candidates(0x4a)
                .map(|pack| {
                    let position = set.packs().iter().position(|p| std::ptr::eq(p, pack)).unwrap();
                    (position, pack.index().prefix_count(0x4a))
                })
                .collect();
            prop_assert_eq!(actual, expected);
        }
    }
}
