use std::collections::{BTreeSet, HashMap, HashSet};

use crate::address_space::{AddressSpace, Frame};
use crate::calltree::{CallTree, TagCounts};
use crate::pprof;
use crate::profile::Profile;
use crate::tagger::{tag_stack, StackTag};

/// A sample whose stack was resolved and tagged.
#[derive(Debug, Clone)]
pub struct ResolvedSample {
    /// Root first.
    pub frames: Vec<Frame>,
    /// One tag per frame.
    pub tags: Vec<StackTag>,
    pub count: u64,
    pub thread_id: u64,
    pub memory_kb: Option<u64>,
    pub jitting: bool,
}

impl ResolvedSample {
    /// The tag of the innermost frame.
    pub fn topmost_tag(&self) -> Option<StackTag> {
        self.tags.last().copied()
    }
}

/// Aggregated statistics over all samples of a profile.
///
/// Every sample is resolved and tagged once, when the `Stats` is created.
pub struct Stats<'a> {
    profile: &'a Profile,
    space: &'a AddressSpace,
    samples: Vec<ResolvedSample>,
}

impl<'a> Stats<'a> {
    pub fn new(profile: &'a Profile, space: &'a AddressSpace) -> Self {
        let samples = profile
            .samples()
            .iter()
            .map(|sample| {
                let frames = space.resolve_stack(sample);
                let tags = tag_stack(space, &frames);
                ResolvedSample {
                    frames,
                    tags,
                    count: sample.count,
                    thread_id: sample.thread_id,
                    memory_kb: sample.memory_kb,
                    jitting: sample.jitting,
                }
            })
            .collect();
        Self {
            profile,
            space,
            samples,
        }
    }

    pub fn profile(&self) -> &'a Profile {
        self.profile
    }

    pub fn address_space(&self) -> &'a AddressSpace {
        self.space
    }

    pub fn samples(&self) -> &[ResolvedSample] {
        &self.samples
    }

    pub fn total_ticks(&self) -> u64 {
        self.samples.iter().fold(0u64, |acc, s| acc.saturating_add(s.count))
    }

    /// Ticks of samples taken while the JIT was compiling.
    pub fn jitting_ticks(&self) -> u64 {
        self.samples
            .iter()
            .filter(|s| s.jitting)
            .fold(0u64, |acc, s| acc.saturating_add(s.count))
    }

    /// Ticks per topmost tag.
    pub fn tag_totals(&self) -> TagCounts {
        let mut totals = TagCounts::new();
        for sample in &self.samples {
            let Some(tag) = sample.topmost_tag() else {
                continue;
            };
            match totals.get_mut(&tag) {
                Some(total) => *total = total.saturating_add(sample.count),
                None => {
                    totals.insert(tag, sample.count);
                }
            }
        }
        totals
    }

    pub fn threads(&self) -> BTreeSet<u64> {
        self.samples.iter().map(|s| s.thread_id).collect()
    }

    pub fn call_tree(&self) -> CallTree {
        let mut tree = CallTree::new();
        for sample in &self.samples {
            tree.add_tagged(&sample.frames, &sample.tags, sample.count);
        }
        tree
    }

    /// The call tree of interpreter level functions only.
    pub fn virtual_call_tree(&self) -> CallTree {
        self.call_tree().virtual_root()
    }

    /// The functions which appear in the most samples, most frequent first.
    ///
    /// A recursive function counts once per sample.
    pub fn top_functions(&self, limit: usize) -> Vec<(String, u64)> {
        let mut counts: HashMap<&str, u64> = HashMap::new();
        for sample in &self.samples {
            let names: HashSet<&str> = sample.frames.iter().map(|f| f.name.as_str()).collect();
            for name in names {
                let total = counts.entry(name).or_insert(0);
                *total = total.saturating_add(sample.count);
            }
        }
        let mut top: Vec<(String, u64)> = counts
            .into_iter()
            .map(|(name, count)| (name.to_owned(), count))
            .collect();
        top.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top.truncate(limit);
        top
    }

    pub fn to_pprof(&self) -> pprof::Profile {
        pprof::build_profile(self)
    }
}
