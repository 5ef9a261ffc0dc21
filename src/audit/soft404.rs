/// Reference response from a known-nonexistent URL, used to recognize
/// servers that answer "not found" with something other than a 404.
#[derive(Debug, Clone, Default)]
pub struct Baseline {
    pub status: u16,
    pub body_length: u64,
    pub redirect_location: String,
}

const REDIRECT_STATUSES: [u16; 4] = [301, 302, 307, 308];

/// A probe is a soft-404 of the baseline when the statuses match and the
/// response looks like the same fallback page: for redirects the Location
/// must match, for everything else the body length must land within 10%
/// (plus a 10-byte floor for tiny pages).
pub fn is_soft_404(
    status: u16,
    body_length: u64,
    redirect_location: &str,
    baseline: Option<&Baseline>,
) -> bool {
    let Some(baseline) = baseline else {
        return false;
    };
    if status != baseline.status {
        return false;
    }

    if REDIRECT_STATUSES.contains(&status) {
        return redirect_location == baseline.redirect_location;
    }

    let tolerance = baseline.body_length as f64 * 0.1 + 10.0;
    let difference = (body_length as f64 - baseline.body_length as f64).abs();
    difference < tolerance
}
