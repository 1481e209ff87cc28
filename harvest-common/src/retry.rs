use std::time;

#[derive(Clone, Debug)]
/// The retry policy that SparqlClient will use to space out retries of transient
/// transport failures on idempotent requests.
pub struct RetryPolicy {
    /// Coefficient to multiply initial_interval with for every past attempt.
    pub backoff_coefficient: u32,
    /// The backoff interval for the first retry.
    pub initial_interval: time::Duration,
    /// The maximum possible backoff between retries.
    pub maximum_interval: Option<time::Duration>,
    /// How many retries to attempt before giving up.
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(backoff_coefficient: u32, initial_interval: time::Duration) -> RetryPolicyBuilder {
        RetryPolicyBuilder::new(backoff_coefficient, initial_interval)
    }

    /// Calculate the time until the next retry for a given attempt number.
    pub fn time_until_next_retry(&self, attempt: u32) -> time::Duration {
        let candidate_interval = self.initial_interval * self.backoff_coefficient.pow(attempt);

        match self.maximum_interval {
            Some(max_interval) => std::cmp::min(candidate_interval, max_interval),
            None => candidate_interval,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicyBuilder::default().provide()
    }
}

pub struct RetryPolicyBuilder {
    pub backoff_coefficient: u32,
    pub initial_interval: time::Duration,
    pub maximum_interval: Option<time::Duration>,
    pub max_attempts: u32,
}

impl Default for RetryPolicyBuilder {
    fn default() -> Self {
        Self {
            backoff_coefficient: 2,
            initial_interval: time::Duration::from_secs(1),
            maximum_interval: None,
            max_attempts: 5,
        }
    }
}

impl RetryPolicyBuilder {
    pub fn new(backoff_coefficient: u32, initial_interval: time::Duration) -> Self {
        Self {
            backoff_coefficient,
            initial_interval,
            ..RetryPolicyBuilder::default()
        }
    }

    pub fn maximum_interval(mut self, interval: time::Duration) -> RetryPolicyBuilder {
        self.maximum_interval = Some(interval);
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> RetryPolicyBuilder {
        self.max_attempts = attempts;
        self
    }

    pub fn provide(&self) -> RetryPolicy {
        RetryPolicy {
            backoff_coefficient: self.backoff_coefficient,
            initial_interval: self.initial_interval,
            maximum_interval: self.maximum_interval,
            max_attempts: self.max_attempts,
        }
    }
}
