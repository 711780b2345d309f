//! Best-asset selection over competing candidate URLs.
//!
//! Pure and deterministic: given the same candidate list and reference ratio
//! it always picks the same winner. The CDN serves the same logical asset in
//! several renditions (original framing, square crop, fixed-size thumbnails);
//! the score prefers the original over any crop.

use gramgrab_common::{Candidate, FetchError};
use regex::Regex;

/// Assumed edge length when a candidate carries no size metadata.
const DEFAULT_DIM: f64 = 1080.0;

/// Max deviation from the reference ratio before a candidate counts as cropped.
const RATIO_TOLERANCE: f64 = 0.1;

/// Candidates this close to 1:1 are treated as square crops when no reference
/// ratio is known.
const SQUARE_TOLERANCE: f64 = 0.03;

const RATIO_MISMATCH_PENALTY: f64 = 0.0001;
const RATIO_MATCH_BONUS: f64 = 1000.0;
const SQUARE_PENALTY: f64 = 0.1;
const EXPLICIT_META_BONUS: f64 = 2.0;

/// Pick the highest-quality candidate.
///
/// `reference_ratio` is the true width/height ratio of the parent item when a
/// strategy exposed it; candidates deviating from it are effectively
/// disqualified. Without it, near-square candidates are penalized on the
/// prior that the platform's default crop is a square thumbnail.
pub fn select_best<'a>(
    candidates: &'a [Candidate],
    reference_ratio: Option<f64>,
) -> Result<&'a Candidate, FetchError> {
    if candidates.is_empty() {
        return Err(FetchError::NoCandidates);
    }

    // Crop-signature URLs lie about their dimensions; drop them unless that
    // would leave nothing to pick from.
    let eligible: Vec<&Candidate> = candidates
        .iter()
        .filter(|c| !is_crop_signature(&c.url))
        .collect();
    let pool: Vec<&Candidate> = if eligible.is_empty() {
        candidates.iter().collect()
    } else {
        eligible
    };

    let mut best = pool[0];
    let mut best_score = score(best, reference_ratio);
    for c in &pool[1..] {
        let s = score(c, reference_ratio);
        if s > best_score {
            best = c;
            best_score = s;
        }
    }

    Ok(best)
}

/// Fixed-size path tokens (`/s150x150/`, `/p640x640_a/`, ...) mark thumbnail
/// CDN renditions.
fn is_crop_signature(url: &str) -> bool {
    let re = Regex::new(r"/[sp]\d{2,4}x\d{2,4}(?:_[a-z0-9]+)?/").expect("valid regex");
    re.is_match(url)
}

fn score(c: &Candidate, reference_ratio: Option<f64>) -> f64 {
    let explicit = c.has_dimensions();

    // Undeclared axes default to the reference framing when one is known,
    // matching how the platform omits dimensions on its bare display URL.
    let (default_w, default_h) = match reference_ratio {
        Some(r) if r > 0.0 => (DEFAULT_DIM * r, DEFAULT_DIM),
        _ => (DEFAULT_DIM, DEFAULT_DIM),
    };
    let width = c.width.map(f64::from).unwrap_or(default_w);
    let height = c.height.map(f64::from).unwrap_or(default_h);

    let area = width * height;
    let ratio = width / height.max(1.0);

    let mut score = area;
    match reference_ratio {
        Some(target) => {
            if (ratio - target).abs() > RATIO_TOLERANCE {
                score *= RATIO_MISMATCH_PENALTY;
            } else {
                score *= RATIO_MATCH_BONUS;
            }
        }
        None => {
            if (ratio - 1.0).abs() < SQUARE_TOLERANCE {
                score *= SQUARE_PENALTY;
            }
        }
    }

    if explicit {
        score *= EXPLICIT_META_BONUS;
    }

    score
}
