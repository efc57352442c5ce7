use soroban_sdk::Vec;

/// Points earned by one set of selections against a round's results.
///
/// Each selection is an option index into `results`. Indices past the end
/// contribute nothing. Returns `None` only if the total overflows.
pub fn points_for(results: &Vec<u32>, selections: &Vec<u32>) -> Option<u64> {
    let mut total: u64 = 0;
    for pick in selections.iter() {
        if let Some(value) = results.get(pick) {
            total = total.checked_add(value as u64)?;
        }
    }
    Some(total)
}
