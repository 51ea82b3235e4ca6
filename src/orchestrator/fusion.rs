//! Result Fusion: merge records that describe the same work.
//!
//! Two modes:
//!
//! - **Cross-reference**: papers sharing any [`MatchKey`] are grouped
//!   transitively (union-find), one representative is chosen per group and
//!   enriched from the other members.
//! - **Basic**: exact DOI or title-key dedup, first occurrence wins, no
//!   field filling.
//!
//! Output order follows each group's first appearance in the input, so
//! fusing an already fused list returns it unchanged.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::types::{FusionMode, FusionStats, Paper, SourceId};

use super::normalize::{match_keys, normalize_doi, title_key, MatchKey};

/// Fuse `papers`, returning the merged list and counts.
pub fn fuse(papers: Vec<Paper>, enable_cross_reference: bool) -> (Vec<Paper>, FusionStats) {
    let input = papers.len();
    let (fused, mode) = if enable_cross_reference {
        (cross_reference(papers), FusionMode::CrossReference)
    } else {
        (basic_dedup(papers), FusionMode::Basic)
    };
    let stats = FusionStats {
        input,
        output: fused.len(),
        mode,
    };
    tracing::debug!(input, output = stats.output, ?mode, "fusion complete");
    (fused, stats)
}

// ── Cross-reference ───────────────────────────────────────────

/// Disjoint-set forest over paper indices.
struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    /// Merge the sets of `a` and `b`; the smaller root wins so roots are
    /// always the earliest member.
    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        match ra.cmp(&rb) {
            Ordering::Less => self.parent[rb] = ra,
            Ordering::Greater => self.parent[ra] = rb,
            Ordering::Equal => {}
        }
    }
}

fn cross_reference(papers: Vec<Paper>) -> Vec<Paper> {
    let mut sets = UnionFind::new(papers.len());
    let mut owner: HashMap<MatchKey, usize> = HashMap::new();

    for (index, paper) in papers.iter().enumerate() {
        for key in match_keys(paper) {
            match owner.get(&key) {
                Some(&first) => sets.union(first, index),
                None => {
                    owner.insert(key, index);
                }
            }
        }
    }

    // Roots are the earliest member, so iterating indices in order yields
    // groups in first-appearance order.
    let mut groups: Vec<Vec<Paper>> = Vec::new();
    let mut slot_of_root: HashMap<usize, usize> = HashMap::new();
    for (index, paper) in papers.into_iter().enumerate() {
        let root = sets.find(index);
        let slot = *slot_of_root.entry(root).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(paper);
    }

    groups.into_iter().filter_map(merge_group).collect()
}

/// Representative priority: more authors, then higher citation count, then
/// longer abstract, then source preference.
fn priority_cmp(a: &Paper, b: &Paper) -> Ordering {
    a.authors
        .len()
        .cmp(&b.authors.len())
        .then(a.citation_count.unwrap_or(0).cmp(&b.citation_count.unwrap_or(0)))
        .then(a.abstract_len().cmp(&b.abstract_len()))
        .then(
            a.source
                .preference_bonus()
                .total_cmp(&b.source.preference_bonus()),
        )
}

fn merge_group(mut members: Vec<Paper>) -> Option<Paper> {
    if members.len() == 1 {
        let mut paper = members.pop()?;
        normalize_provenance(&mut paper);
        return Some(paper);
    }

    // Ties on priority and field filling go to the lexicographically
    // smallest (source id, paper id), independent of arrival order.
    members.sort_by(|a, b| (a.source, &a.id).cmp(&(b.source, &b.id)));

    let mut best = 0;
    for (i, candidate) in members.iter().enumerate().skip(1) {
        if priority_cmp(candidate, &members[best]) == Ordering::Greater {
            best = i;
        }
    }
    let mut rep = members.swap_remove(best);
    members.sort_by(|a, b| (a.source, &a.id).cmp(&(b.source, &b.id)));

    let max_citations = members
        .iter()
        .filter_map(|m| m.citation_count)
        .chain(rep.citation_count)
        .max();

    for member in &members {
        enrich(&mut rep, member);
    }
    rep.citation_count = max_citations;

    tracing::trace!(
        id = %rep.id,
        merged = members.len() + 1,
        "merged duplicate records"
    );
    Some(rep)
}

/// Fill fields missing on `rep` from `member`. Never overwrites.
fn enrich(rep: &mut Paper, member: &Paper) {
    fn fill<T: Clone>(slot: &mut Option<T>, from: &Option<T>) {
        if slot.is_none() {
            slot.clone_from(from);
        }
    }

    fill(&mut rep.doi, &member.doi);
    fill(&mut rep.arxiv_id, &member.arxiv_id);
    fill(&mut rep.pdf_url, &member.pdf_url);
    fill(&mut rep.publication_date, &member.publication_date);
    fill(&mut rep.venue, &member.venue);
    fill(&mut rep.reference_count, &member.reference_count);
    if rep.abstract_len() == 0 && member.abstract_len() > 0 {
        rep.abstract_text.clone_from(&member.abstract_text);
    }
    if rep.authors.is_empty() {
        rep.authors.clone_from(&member.authors);
    }
    if rep.topics.is_empty() {
        rep.topics.clone_from(&member.topics);
    }
    merge_provenance(rep, &member.found_in, member.source);
}

fn merge_provenance(rep: &mut Paper, found_in: &[SourceId], source: SourceId) {
    rep.found_in.extend_from_slice(found_in);
    rep.found_in.push(source);
    normalize_provenance(rep);
}

/// Sorted, duplicate-free `found_in` that always includes the origin.
fn normalize_provenance(paper: &mut Paper) {
    if !paper.found_in.contains(&paper.source) {
        paper.found_in.push(paper.source);
    }
    paper.found_in.sort();
    paper.found_in.dedup();
}

// ── Basic ─────────────────────────────────────────────────────

fn basic_dedup(papers: Vec<Paper>) -> Vec<Paper> {
    let mut seen_doi: HashMap<String, usize> = HashMap::new();
    let mut seen_title: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<Paper> = Vec::with_capacity(papers.len());

    for mut paper in papers {
        let doi = paper.doi.as_deref().and_then(normalize_doi);
        let title = title_key(&paper.title);

        let existing = doi
            .as_ref()
            .and_then(|d| seen_doi.get(d))
            .or_else(|| title.as_ref().and_then(|t| seen_title.get(t)))
            .copied();

        match existing {
            Some(index) => {
                merge_provenance(&mut out[index], &paper.found_in, paper.source);
            }
            None => {
                normalize_provenance(&mut paper);
                let index = out.len();
                if let Some(d) = doi {
                    seen_doi.insert(d, index);
                }
                if let Some(t) = title {
                    seen_title.insert(t, index);
                }
                out.push(paper);
            }
        }
    }
    out
}
