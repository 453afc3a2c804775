use crate::error::{Error, Result};

/// Per-entry outcome of an operation applied to several names. Every entry
/// is attempted; failures are collected rather than short-circuiting.
#[derive(Debug)]
pub struct BatchReport<T> {
    pub results: Vec<(String, Result<T>)>,
}

impl<T> Default for BatchReport<T> {
    fn default() -> Self {
        Self {
            results: Vec::new(),
        }
    }
}

impl<T> BatchReport<T> {
    pub fn push(&mut self, name: impl Into<String>, result: Result<T>) {
        self.results.push((name.into(), result));
    }

    pub fn is_success(&self) -> bool {
        self.results.iter().all(|(_, r)| r.is_ok())
    }

    pub fn failure_count(&self) -> usize {
        self.results.iter().filter(|(_, r)| r.is_err()).count()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Result<T>> {
        self.results.iter().find(|(n, _)| n == name).map(|(_, r)| r)
    }

    /// Successful values, or every failure wrapped in `Error::Multiple`.
    pub fn into_result(self) -> Result<Vec<(String, T)>> {
        let mut ok = Vec::new();
        let mut errors = Vec::new();
        for (name, result) in self.results {
            match result {
                Ok(value) => ok.push((name, value)),
                Err(e) => errors.push(e),
            }
        }
        match errors.len() {
            0 => Ok(ok),
            1 => Err(errors.remove(0)),
            _ => Err(Error::Multiple(errors)),
        }
    }
}

impl<T> FromIterator<(String, Result<T>)> for BatchReport<T> {
    fn from_iter<I: IntoIterator<Item = (String, Result<T>)>>(iter: I) -> Self {
        Self {
            results: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_all_failures() {
        let report: BatchReport<u32> = vec![
            ("a".to_string(), Ok(1)),
            ("b".to_string(), Err(Error::ServerNotFound("b".into()))),
            ("c".to_string(), Err(Error::Timeout("c".into()))),
        ]
        .into_iter()
        .collect();

        assert!(!report.is_success());
        assert_eq!(report.failure_count(), 2);
        assert!(matches!(report.get("a"), Some(Ok(1))));
        match report.into_result() {
            Err(Error::Multiple(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn single_failure_is_not_wrapped() {
        let mut report = BatchReport::<()>::default();
        report.push("a", Ok(()));
        report.push("b", Err(Error::ServerNotFound("b".into())));
        assert!(matches!(report.into_result(), Err(Error::ServerNotFound(_))));
    }
}
