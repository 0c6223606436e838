//! Стратифицированное разбиение на train/test и на фолды кросс-валидации

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::TrainingError;

/// Индексы строк по классам, каждая группа перемешана детерминированно
fn shuffled_groups(targets: &[usize], rng: &mut StdRng) -> BTreeMap<usize, Vec<usize>> {
    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (i, &class) in targets.iter().enumerate() {
        groups.entry(class).or_default().push(i);
    }
    for indices in groups.values_mut() {
        indices.shuffle(rng);
    }
    groups
}

/// Разбиение с сохранением долей классов. Возвращает (train, test), индексы отсортированы
pub fn stratified_split(
    targets: &[usize],
    test_size: f64,
    seed: u64,
) -> Result<(Vec<usize>, Vec<usize>), TrainingError> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(TrainingError::InvalidParameter(format!(
            "test_size must be in (0, 1), got {}",
            test_size
        )));
    }
    if targets.len() < 2 {
        return Err(TrainingError::InsufficientData(format!(
            "need at least 2 rows to split, got {}",
            targets.len()
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut test = Vec::new();

    for (_, indices) in shuffled_groups(targets, &mut rng) {
        let n = indices.len();
        // Класс из одной строки целиком уходит в train
        let n_test = if n < 2 {
            0
        } else {
            ((n as f64 * test_size).round() as usize).clamp(1, n - 1)
        };
        test.extend_from_slice(&indices[..n_test]);
        train.extend_from_slice(&indices[n_test..]);
    }

    if test.is_empty() {
        return Err(TrainingError::InsufficientData(
            "test split is empty: every class has a single row".to_string(),
        ));
    }

    train.sort_unstable();
    test.sort_unstable();
    Ok((train, test))
}

/// Стратифицированные фолды: для каждого фолда (train, validation) в терминах позиций `targets`
pub fn stratified_folds(
    targets: &[usize],
    k: usize,
    seed: u64,
) -> Result<Vec<(Vec<usize>, Vec<usize>)>, TrainingError> {
    if k < 2 {
        return Err(TrainingError::InvalidParameter(format!(
            "cv_folds must be at least 2, got {}",
            k
        )));
    }
    if targets.len() < k {
        return Err(TrainingError::InsufficientData(format!(
            "cannot split {} rows into {} folds",
            targets.len(),
            k
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut assignment = vec![0usize; targets.len()];
    let mut next_fold = 0usize;
    // Раздача по кругу, продолжая с того фолда, где остановился предыдущий класс
    for (_, indices) in shuffled_groups(targets, &mut rng) {
        for idx in indices {
            assignment[idx] = next_fold;
            next_fold = (next_fold + 1) % k;
        }
    }

    Ok((0..k)
        .map(|fold| {
            let (valid, train): (Vec<usize>, Vec<usize>) =
                (0..targets.len()).partition(|&i| assignment[i] == fold);
            (train, valid)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn targets() -> Vec<usize> {
        (0..30).map(|i| i % 3).collect()
    }

    #[test]
    fn test_split_is_stratified_and_disjoint() {
        let y = targets();
        let (train, test) = stratified_split(&y, 0.3, 42).unwrap();
        assert_eq!(train.len() + test.len(), y.len());
        assert_eq!(test.len(), 9);
        for class in 0..3 {
            assert_eq!(test.iter().filter(|&&i| y[i] == class).count(), 3);
        }
        assert!(train.iter().all(|i| !test.contains(i)));
    }

    #[test]
    fn test_split_is_deterministic() {
        let y = targets();
        assert_eq!(stratified_split(&y, 0.3, 7).unwrap(), stratified_split(&y, 0.3, 7).unwrap());
    }

    #[test]
    fn test_split_rejects_bad_test_size() {
        assert!(stratified_split(&targets(), 0.0, 42).is_err());
        assert!(stratified_split(&targets(), 1.0, 42).is_err());
    }

    #[test]
    fn test_folds_cover_every_row_once() {
        let y = targets();
        let folds = stratified_folds(&y, 5, 42).unwrap();
        assert_eq!(folds.len(), 5);
        let mut seen = vec![0; y.len()];
        for (train, valid) in &folds {
            assert!(!valid.is_empty());
            assert_eq!(train.len() + valid.len(), y.len());
            for &i in valid {
                seen[i] += 1;
            }
        }
        assert!(seen.iter().all(|&c| c == 1));
    }

    #[test]
    fn test_too_many_folds() {
        assert!(stratified_folds(&[0, 1], 5, 42).is_err());
        assert!(stratified_folds(&targets(), 1, 42).is_err());
    }
}
