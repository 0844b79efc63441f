use lumokv::{
    Database, DbFlags, EnvOptions, Environment, Error, Transaction, TxnMode, TxnState, WriteFlags,
};
use tempfile::TempDir;

fn setup_test_env() -> (TempDir, Environment) {
    let temp_dir = TempDir::new().unwrap();
    let env = Environment::open(temp_dir.path(), EnvOptions::default()).unwrap();
    (temp_dir, env)
}

#[test]
fn test_commit_twice_fails() {
    let (_dir, env) = setup_test_env();
    let mut txn = env.begin_transaction(TxnMode::ReadWrite).unwrap();
    txn.commit().unwrap();

    match txn.commit() {
        Err(Error::Transaction { state, expected }) => {
            assert_eq!(state, TxnState::Committed);
            assert_eq!(expected, TxnState::Active);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_abort_is_idempotent() {
    let (_dir, env) = setup_test_env();
    let mut txn = env.begin_transaction(TxnMode::ReadWrite).unwrap();
    txn.abort();
    txn.abort();
    assert_eq!(txn.state(), TxnState::Aborted);

    let mut committed = env.begin_transaction(TxnMode::ReadWrite).unwrap();
    committed.commit().unwrap();
    committed.abort();
    assert_eq!(committed.state(), TxnState::Committed);
}

#[test]
fn test_aborted_writes_are_invisible() {
    let (_dir, env) = setup_test_env();
    let db = env.open_database(None, DbFlags::empty()).unwrap();

    let mut txn = env.begin_transaction(TxnMode::ReadWrite).unwrap();
    db.put(&txn, b"k", b"v", WriteFlags::empty()).unwrap();
    txn.abort();

    let txn = env.begin_transaction(TxnMode::ReadOnly).unwrap();
    assert_eq!(db.get(&txn, b"k").unwrap(), None);
}

#[test]
fn test_dropped_transaction_aborts() {
    let (_dir, env) = setup_test_env();
    let db = env.open_database(None, DbFlags::empty()).unwrap();
    {
        let txn = env.begin_transaction(TxnMode::ReadWrite).unwrap();
        db.put(&txn, b"k", b"v", WriteFlags::empty()).unwrap();
    }
    let txn = env.begin_transaction(TxnMode::ReadOnly).unwrap();
    assert_eq!(db.get(&txn, b"k").unwrap(), None);
}

#[test]
fn test_run_in_transaction_commits_on_ok() {
    let (_dir, env) = setup_test_env();
    let db = env.open_database(None, DbFlags::empty()).unwrap();

    let value = env
        .run_in_transaction(TxnMode::ReadWrite, |txn| {
            db.put(txn, b"k", b"v", WriteFlags::empty())?;
            Ok::<_, Error>(7)
        })
        .unwrap();
    assert_eq!(value, 7);

    let txn = env.begin_transaction(TxnMode::ReadOnly).unwrap();
    assert_eq!(db.get(&txn, b"k").unwrap(), Some(b"v".to_vec()));
}

#[derive(Debug)]
enum AppError {
    Rejected,
    Store(Error),
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        AppError::Store(err)
    }
}

#[test]
fn test_run_in_transaction_aborts_on_err() {
    let (_dir, env) = setup_test_env();
    let db = env.open_database(None, DbFlags::empty()).unwrap();

    let result: Result<(), AppError> = env.run_in_transaction(TxnMode::ReadWrite, |txn| {
        db.put(txn, b"k", b"v", WriteFlags::empty())?;
        Err(AppError::Rejected)
    });
    assert!(matches!(result, Err(AppError::Rejected)));

    let txn = env.begin_transaction(TxnMode::ReadOnly).unwrap();
    assert_eq!(db.get(&txn, b"k").unwrap(), None);
}

#[test]
fn test_engine_errors_pass_through_run_in_transaction() {
    let (_dir, env) = setup_test_env();
    let db = env.open_database(None, DbFlags::empty()).unwrap();

    let result: Result<(), AppError> = env.run_in_transaction(TxnMode::ReadOnly, |txn| {
        db.put(txn, b"k", b"v", WriteFlags::empty())?;
        Ok(())
    });
    assert!(matches!(result, Err(AppError::Store(Error::InvariantViolation(_)))));
}

#[test]
fn test_renew_sees_later_commits() {
    let (_dir, env) = setup_test_env();
    let db = env.open_database(None, DbFlags::empty()).unwrap();

    let mut reader = env.begin_transaction(TxnMode::ReadOnly).unwrap();
    assert_eq!(db.get(&reader, b"k").unwrap(), None);
    reader.reset().unwrap();

    env.run_in_transaction(TxnMode::ReadWrite, |txn| {
        db.put(txn, b"k", b"after", WriteFlags::empty())
    })
    .unwrap();

    reader.renew().unwrap();
    assert_eq!(db.get(&reader, b"k").unwrap(), Some(b"after".to_vec()));
}

#[test]
fn test_reset_state_rules() {
    let (_dir, env) = setup_test_env();
    let db = env.open_database(None, DbFlags::empty()).unwrap();
    let mut reader = env.begin_transaction(TxnMode::ReadOnly).unwrap();

    assert!(matches!(reader.renew(), Err(Error::Transaction { .. })));
    reader.reset().unwrap();
    assert!(matches!(reader.reset(), Err(Error::Transaction { .. })));
    assert!(matches!(reader.commit(), Err(Error::Transaction { .. })));
    assert!(matches!(db.get(&reader, b"k"), Err(Error::Transaction { .. })));

    reader.abort();
    assert_eq!(reader.state(), TxnState::Aborted);
    assert!(matches!(db.get(&reader, b"k"), Err(Error::UseAfterClose(_))));
}

fn put(txn: &Transaction, db: lumokv::DatabaseHandle, key: &[u8], value: &[u8]) {
    db.put(txn, key, value, WriteFlags::empty()).unwrap();
}

#[test]
fn test_nested_commit_reaches_parent() {
    let (_dir, env) = setup_test_env();
    let db = env.open_database(None, DbFlags::empty()).unwrap();

    let mut parent = env.begin_transaction(TxnMode::ReadWrite).unwrap();
    put(&parent, db, b"parent", b"1");
    {
        let mut child = parent.begin_nested().unwrap();
        put(&child, db, b"child", b"2");
        assert_eq!(db.get(&child, b"parent").unwrap(), Some(b"1".to_vec()));
        child.commit().unwrap();
    }
    assert_eq!(db.get(&parent, b"child").unwrap(), Some(b"2".to_vec()));

    {
        let txn = env.begin_transaction(TxnMode::ReadOnly).unwrap();
        assert_eq!(db.get(&txn, b"child").unwrap(), None);
    }
    parent.commit().unwrap();

    let txn = env.begin_transaction(TxnMode::ReadOnly).unwrap();
    assert_eq!(db.get(&txn, b"child").unwrap(), Some(b"2".to_vec()));
}

#[test]
fn test_nested_abort_keeps_parent_writes() {
    let (_dir, env) = setup_test_env();
    let db = env.open_database(None, DbFlags::empty()).unwrap();

    let mut parent = env.begin_transaction(TxnMode::ReadWrite).unwrap();
    put(&parent, db, b"parent", b"1");
    {
        let child = parent.begin_nested().unwrap();
        put(&child, db, b"child", b"2");
        // Dropped without commit.
    }
    assert_eq!(db.get(&parent, b"child").unwrap(), None);
    assert_eq!(db.get(&parent, b"parent").unwrap(), Some(b"1".to_vec()));
    parent.commit().unwrap();
}

#[test]
fn test_nested_needs_read_write_parent() {
    let (_dir, env) = setup_test_env();
    let mut reader = env.begin_transaction(TxnMode::ReadOnly).unwrap();
    assert!(matches!(reader.begin_nested(), Err(Error::InvariantViolation(_))));
}

#[test]
fn test_facade_transaction_aborts_on_err() {
    let (_dir, env) = setup_test_env();
    let db = Database::open(&env, None, DbFlags::empty()).unwrap();

    let result: Result<(), Error> = db.transaction(TxnMode::ReadWrite, |txn, handle| {
        handle.put(txn, b"k", b"v", WriteFlags::empty())?;
        Err(Error::NotFound)
    });
    assert!(result.is_err());
    assert_eq!(db.lookup(b"k").unwrap(), None);
}
