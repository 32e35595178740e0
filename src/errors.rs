use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub struct ExpectedValue<T: fmt::Debug> {
    value: Option<T>,
}

impl<T: fmt::Debug> fmt::Display for ExpectedValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Expected a value, found {:?}", self.value)
    }
}

impl<T: fmt::Debug> Error for ExpectedValue<T> {}

impl<T: fmt::Debug> ExpectedValue<T> {
    pub fn cast(value: Option<T>) -> Result<T, Self> {
        match value {
            Some(v) => Ok(v),
            None => Err(Self { value }),
        }
    }
}

/// Problems with the instance itself. These are fatal and raised before the search starts.
#[derive(Debug, Clone, PartialEq)]
pub enum InvalidInstance {
    EmptyTsp,
    UnknownDroneModel(String),
    MalformedCoefficients(String),
    MissingField(&'static str),
    NoMatchingDroneConfig { speed_type: String, range_type: String },
    UnservableCustomer(usize),
    CustomerCountMismatch { declared: usize, found: usize },
    NoVehicles,
}

impl fmt::Display for InvalidInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyTsp => write!(f, "Empty TSP problem"),
            Self::UnknownDroneModel(model) => write!(f, "Unknown drone energy model \"{model}\""),
            Self::MalformedCoefficients(reason) => write!(f, "Malformed truck speed coefficients: {reason}"),
            Self::MissingField(field) => write!(f, "Missing {field} in problem file"),
            Self::NoMatchingDroneConfig { speed_type, range_type } => write!(
                f,
                "No drone config with speed type \"{speed_type}\" and range type \"{range_type}\""
            ),
            Self::UnservableCustomer(customer) => {
                write!(f, "Customer {customer} cannot be served by neither trucks nor drones")
            }
            Self::CustomerCountMismatch { declared, found } => {
                write!(f, "Problem declares {declared} customers but lists {found}")
            }
            Self::NoVehicles => write!(f, "The fleet has no vehicles"),
        }
    }
}

impl Error for InvalidInstance {}

/// Numeric domain failures. Seeing one of these means the caller passed a bad argument.
#[derive(Debug, Clone, PartialEq)]
pub enum InvalidArgument {
    NegativeSqrt(f64),
    SelectionExceedsPopulation { count: usize, population: usize },
    NegativeWeight(f64),
    EmptyPopulation,
}

impl fmt::Display for InvalidArgument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NegativeSqrt(value) => write!(f, "Attempted to calculate square root of {value} < 0"),
            Self::SelectionExceedsPopulation { count, population } => {
                write!(f, "Argument \"count\" exceeded the number of weights ({count} > {population})")
            }
            Self::NegativeWeight(weight) => write!(f, "Received weight {weight} < 0.0"),
            Self::EmptyPopulation => write!(f, "Cannot select an element from an empty population"),
        }
    }
}

impl Error for InvalidArgument {}

/// A solution that breaks a structural rule: a customer served twice or never, a route not bounded by the
/// depot, a drone carrying a customer it cannot serve.
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidSolution {
    pub reason: String,
}

impl fmt::Display for InvalidSolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid solution: {}", self.reason)
    }
}

impl Error for InvalidSolution {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cast_some_and_none() {
        assert_eq!(ExpectedValue::cast(Some(3)).ok(), Some(3));
        assert!(ExpectedValue::<usize>::cast(None).is_err());
    }

    #[test]
    fn messages_name_the_culprit() {
        assert!(InvalidInstance::UnservableCustomer(7).to_string().contains('7'));
        let e = InvalidArgument::SelectionExceedsPopulation {
            count: 5,
            population: 3,
        };
        assert!(e.to_string().contains("5 > 3"));
    }
}
