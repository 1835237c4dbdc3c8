//! Newtype identifiers. Kept distinct so a `FileId` can never be passed
//! where a `UriId` is expected even though both are `u64` underneath.

use std::fmt;

macro_rules! id_type {
    ($name:ident) => {
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
        pub struct $name(pub u64);

        impl $name {
            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(v: u64) -> Self {
                $name(v)
            }
        }
    };
}

id_type!(FileId);
id_type!(UriId);
id_type!(UserId);
id_type!(SessionId);

/// The submission-sequence id: monotonic, assigned at commit time, and the
/// primary sort key for every query result stream.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub struct SubmissionSequence(pub u64);

impl SubmissionSequence {
    pub const MIN: SubmissionSequence = SubmissionSequence(0);
    pub const MAX: SubmissionSequence = SubmissionSequence(u64::MAX);
}

impl fmt::Display for SubmissionSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
