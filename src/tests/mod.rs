mod runtime;
mod support;

mod test_admission;
mod test_common_validation;
