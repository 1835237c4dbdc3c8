//! Password verification and the `auth(user, pass)` entry point. The
//! source repository's exact password-hash algorithm is unspecified
//! (see `spec.md` §9's open questions); this implementation uses salted
//! SHA-256 rather than pulling in a KDF crate the teacher never depends
//! on (documented in DESIGN.md).

use crate::codec::TableId;
use crate::error::{SlnError, SlnResult};
use crate::ids::UserId;
use crate::kv::KvTransaction;
use crate::nonce::random_bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Clone, Serialize, Deserialize)]
pub struct PasswordVerifier {
    pub salt: Vec<u8>,
    pub digest: Vec<u8>,
}

impl PasswordVerifier {
    pub fn hash(password: &str) -> PasswordVerifier {
        let salt = random_bytes(16);
        PasswordVerifier {
            digest: Self::digest(&salt, password),
            salt,
        }
    }

    pub fn verify(&self, password: &str) -> bool {
        Self::digest(&self.salt, password) == self.digest
    }

    fn digest(salt: &[u8], password: &str) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(salt);
        hasher.update(password.as_bytes());
        hasher.finalize().to_vec()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: u64,
    pub name: String,
    pub verifier: PasswordVerifier,
}

/// Looks up a user record by name via the `Users` table, keyed by the
/// username string (inline-or-hashed per the schema codec).
pub fn find_user(txn: &dyn KvTransaction, name: &str) -> SlnResult<Option<UserRecord>> {
    let mut key = Vec::new();
    crate::codec::encode_string(Some(name), &mut key);
    let Some(raw) = txn.get(TableId::Users, &key)? else {
        return Ok(None);
    };
    let record: UserRecord =
        serde_json::from_slice(&raw).map_err(|e| SlnError::Panic(format!("corrupt user record: {e}")))?;
    Ok(Some(record))
}

/// Creates a user record (used by repository bootstrap / admin tooling,
/// not exposed over HTTP — user provisioning is out of the HTTP surface
/// defined in `spec.md` §6).
pub fn create_user(txn: &dyn KvTransaction, id: UserId, name: &str, password: &str) -> SlnResult<()> {
    let mut key = Vec::new();
    crate::codec::encode_string(Some(name), &mut key);
    let record = UserRecord {
        id: id.get(),
        name: name.to_string(),
        verifier: PasswordVerifier::hash(password),
    };
    let value = serde_json::to_vec(&record).expect("UserRecord serializes");
    txn.put(TableId::Users, &key, &value)
}

/// Verifies `user`/`pass`. Returns the user id on success.
pub fn authenticate(txn: &dyn KvTransaction, user: &str, pass: &str) -> SlnResult<UserId> {
    let record = find_user(txn, user)?.ok_or(SlnError::Eacces)?;
    if !record.verifier.verify(pass) {
        return Err(SlnError::Eacces);
    }
    Ok(UserId(record.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::memory::MemoryEnv;
    use crate::kv::KvEnvironment;

    #[test]
    fn create_then_authenticate_succeeds() {
        let env = MemoryEnv::new();
        let txn = env.begin(true).unwrap();
        create_user(&*txn, UserId(1), "alice", "hunter2").unwrap();
        txn.commit().unwrap();

        let txn2 = env.begin(false).unwrap();
        let id = authenticate(&*txn2, "alice", "hunter2").unwrap();
        assert_eq!(id, UserId(1));
    }

    #[test]
    fn wrong_password_is_denied() {
        let env = MemoryEnv::new();
        let txn = env.begin(true).unwrap();
        create_user(&*txn, UserId(1), "alice", "hunter2").unwrap();
        txn.commit().unwrap();

        let txn2 = env.begin(false).unwrap();
        assert!(matches!(
            authenticate(&*txn2, "alice", "wrong"),
            Err(SlnError::Eacces)
        ));
    }

    #[test]
    fn unknown_user_is_denied() {
        let env = MemoryEnv::new();
        let txn = env.begin(false).unwrap();
        assert!(matches!(
            authenticate(&*txn, "nobody", "x"),
            Err(SlnError::Eacces)
        ));
    }
}
