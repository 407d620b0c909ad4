use std::cmp::Ordering;

use itertools::Itertools;

/// Competition ("min") places for `values`, highest value first.
///
/// Equal values share the best place of their group and the next distinct value
/// skips the shared positions: `[30, 50, 50, 10]` → `[3, 1, 1, 4]`.
/// Places are returned in the order of the input.
pub fn competition_places<T: PartialOrd + Copy>(values: &[T]) -> Vec<i32> {
    let order = (0..values.len())
        .sorted_by(|&a, &b| values[b].partial_cmp(&values[a]).unwrap_or(Ordering::Equal))
        .collect_vec();

    let mut places = vec![0; values.len()];
    let mut current_place = 0;
    let mut previous: Option<T> = None;

    for (position, &index) in order.iter().enumerate() {
        let value = values[index];
        let tied = previous.is_some_and(|p| p.partial_cmp(&value) == Some(Ordering::Equal));

        if !tied {
            current_place = position as i32 + 1;
        }

        places[index] = current_place;
        previous = Some(value);
    }

    places
}

/// Change of place between releases, positive when moving up
pub fn place_change(previous: Option<i32>, current: Option<i32>) -> Option<i32> {
    match (previous, current) {
        (Some(p), Some(c)) => Some(p - c),
        _ => None
    }
}
