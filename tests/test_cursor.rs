use lumokv::{
    DatabaseHandle, DbFlags, EnvOptions, Environment, Error, Record, TxnMode, WriteFlags,
};
use tempfile::TempDir;

fn setup_test_env() -> (TempDir, Environment) {
    let temp_dir = TempDir::new().unwrap();
    let env = Environment::open(temp_dir.path(), EnvOptions::new().max_databases(4)).unwrap();
    (temp_dir, env)
}

fn fill(env: &Environment, db: DatabaseHandle, pairs: &[(&str, &str)]) {
    env.run_in_transaction(TxnMode::ReadWrite, |txn| {
        for (key, value) in pairs {
            db.put(txn, key.as_bytes(), value.as_bytes(), WriteFlags::empty())?;
        }
        Ok::<_, Error>(())
    })
    .unwrap();
}

fn rec(key: &str, value: &str) -> Option<Record> {
    Some(Record::new(key.as_bytes(), value.as_bytes()))
}

fn dupsort(env: &Environment) -> DatabaseHandle {
    let db = env
        .open_database(Some("dups"), DbFlags::CREATE | DbFlags::DUPSORT)
        .unwrap();
    fill(
        env,
        db,
        &[("a", "1"), ("a", "2"), ("a", "3"), ("b", "1"), ("c", "1"), ("c", "2")],
    );
    db
}

#[test]
fn test_basic_positioning() {
    let (_dir, env) = setup_test_env();
    let db = env.open_database(None, DbFlags::empty()).unwrap();
    fill(&env, db, &[("apple", "1"), ("banana", "2"), ("cherry", "3")]);

    let txn = env.begin_transaction(TxnMode::ReadOnly).unwrap();
    let mut cursor = db.cursor(&txn).unwrap();

    assert_eq!(cursor.first().unwrap(), rec("apple", "1"));
    assert_eq!(cursor.next().unwrap(), rec("banana", "2"));
    assert_eq!(cursor.get_current().unwrap(), rec("banana", "2"));
    assert_eq!(cursor.next().unwrap(), rec("cherry", "3"));
    assert_eq!(cursor.next().unwrap(), None);

    assert_eq!(cursor.last().unwrap(), rec("cherry", "3"));
    assert_eq!(cursor.prev().unwrap(), rec("banana", "2"));

    assert_eq!(cursor.set(b"apple").unwrap(), rec("apple", "1"));
    assert_eq!(cursor.set(b"avocado").unwrap(), None);
    assert_eq!(cursor.set_key(b"cherry").unwrap(), rec("cherry", "3"));
    assert_eq!(cursor.set_range(b"b").unwrap(), rec("banana", "2"));
    assert_eq!(cursor.set_range(b"d").unwrap(), None);
}

#[test]
fn test_empty_database() {
    let (_dir, env) = setup_test_env();
    let db = env.open_database(None, DbFlags::empty()).unwrap();
    let txn = env.begin_transaction(TxnMode::ReadOnly).unwrap();
    let mut cursor = db.cursor(&txn).unwrap();

    assert_eq!(cursor.first().unwrap(), None);
    assert_eq!(cursor.last().unwrap(), None);
    assert_eq!(cursor.iter().count(), 0);
}

#[test]
fn test_duplicate_walks() {
    let (_dir, env) = setup_test_env();
    let db = dupsort(&env);
    let txn = env.begin_transaction(TxnMode::ReadOnly).unwrap();
    let mut cursor = db.cursor(&txn).unwrap();

    assert_eq!(cursor.set_key(b"a").unwrap(), rec("a", "1"));
    assert_eq!(cursor.count().unwrap(), 3);
    assert_eq!(cursor.next_dup().unwrap(), rec("a", "2"));
    assert_eq!(cursor.last_dup().unwrap(), rec("a", "3"));
    assert_eq!(cursor.next_dup().unwrap(), None);
    assert_eq!(cursor.prev_dup().unwrap(), rec("a", "2"));
    assert_eq!(cursor.first_dup().unwrap(), rec("a", "1"));

    // next crosses into the following key, next_dup does not.
    cursor.last_dup().unwrap();
    assert_eq!(cursor.next().unwrap(), rec("b", "1"));

    cursor.set_key(b"a").unwrap();
    assert_eq!(cursor.next_nodup().unwrap(), rec("b", "1"));
    assert_eq!(cursor.next_nodup().unwrap(), rec("c", "1"));
    assert_eq!(cursor.next_nodup().unwrap(), None);

    cursor.last().unwrap();
    assert_eq!(cursor.prev_nodup().unwrap(), rec("b", "1"));
}

#[test]
fn test_get_both() {
    let (_dir, env) = setup_test_env();
    let db = dupsort(&env);
    let txn = env.begin_transaction(TxnMode::ReadOnly).unwrap();
    let mut cursor = db.cursor(&txn).unwrap();

    assert_eq!(cursor.get_both(b"a", b"2").unwrap(), rec("a", "2"));
    assert_eq!(cursor.get_both(b"a", b"9").unwrap(), None);
    assert_eq!(cursor.get_both_range(b"c", b"15").unwrap(), rec("c", "2"));
}

#[test]
fn test_iterators() {
    let (_dir, env) = setup_test_env();
    let db = dupsort(&env);
    let txn = env.begin_transaction(TxnMode::ReadOnly).unwrap();
    let mut cursor = db.cursor(&txn).unwrap();

    let all: Vec<Record> = cursor.iter().collect::<Result<_, _>>().unwrap();
    assert_eq!(all.len(), 6);
    assert_eq!(Some(all[0].clone()), rec("a", "1"));

    let from_b: Vec<Record> = cursor.iter_from(b"b").collect::<Result<_, _>>().unwrap();
    assert_eq!(from_b.len(), 3);

    let values: Vec<Vec<u8>> = cursor
        .iter_dup_of(b"c")
        .map(|r| r.map(|r| r.value))
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(values, vec![b"1".to_vec(), b"2".to_vec()]);

    assert_eq!(cursor.iter_dup_of(b"zz").count(), 0);
}

#[test]
fn test_cursor_writes() {
    let (_dir, env) = setup_test_env();
    let db = dupsort(&env);

    let mut txn = env.begin_transaction(TxnMode::ReadWrite).unwrap();
    {
        let mut cursor = db.cursor(&txn).unwrap();
        cursor.put(b"d", b"1", WriteFlags::empty()).unwrap();

        cursor.get_both(b"a", b"2").unwrap();
        cursor.del(false).unwrap();

        cursor.set_key(b"c").unwrap();
        cursor.del(true).unwrap();
    }
    txn.commit().unwrap();

    let txn = env.begin_transaction(TxnMode::ReadOnly).unwrap();
    let mut cursor = db.cursor(&txn).unwrap();
    let all: Vec<(Vec<u8>, Vec<u8>)> = cursor
        .iter()
        .map(|r| r.map(Into::into))
        .collect::<Result<_, _>>()
        .unwrap();
    let expected: Vec<(Vec<u8>, Vec<u8>)> = [("a", "1"), ("a", "3"), ("b", "1"), ("d", "1")]
        .iter()
        .map(|(k, v)| (k.as_bytes().to_vec(), v.as_bytes().to_vec()))
        .collect();
    assert_eq!(all, expected);
}

#[test]
fn test_use_after_close() {
    let (_dir, env) = setup_test_env();
    let db = env.open_database(None, DbFlags::empty()).unwrap();
    let txn = env.begin_transaction(TxnMode::ReadOnly).unwrap();
    let mut cursor = db.cursor(&txn).unwrap();

    cursor.close();
    assert!(cursor.is_closed());
    assert!(matches!(cursor.first(), Err(Error::UseAfterClose("cursor"))));
    assert!(matches!(cursor.count(), Err(Error::UseAfterClose(_))));
    assert!(matches!(cursor.renew(&txn), Err(Error::UseAfterClose(_))));
    cursor.close();
}

#[test]
fn test_use_after_commit() {
    let (_dir, env) = setup_test_env();
    let db = env.open_database(None, DbFlags::empty()).unwrap();
    fill(&env, db, &[("k", "v")]);

    let mut txn = env.begin_transaction(TxnMode::ReadOnly).unwrap();
    let mut cursor = db.cursor(&txn).unwrap();
    assert_eq!(cursor.first().unwrap(), rec("k", "v"));
    txn.commit().unwrap();

    assert!(matches!(cursor.next(), Err(Error::UseAfterClose(_))));
}

#[test]
fn test_reset_makes_cursor_stale_until_renewed() {
    let (_dir, env) = setup_test_env();
    let db = env.open_database(None, DbFlags::empty()).unwrap();
    fill(&env, db, &[("k", "before")]);

    let mut txn = env.begin_transaction(TxnMode::ReadOnly).unwrap();
    let mut cursor = db.cursor(&txn).unwrap();
    assert_eq!(cursor.first().unwrap(), rec("k", "before"));

    txn.reset().unwrap();
    assert!(matches!(cursor.first(), Err(Error::UseAfterClose(_))));

    fill(&env, db, &[("k", "after")]);
    txn.renew().unwrap();
    // Renewing the transaction alone does not revive the cursor.
    assert!(matches!(cursor.first(), Err(Error::UseAfterClose(_))));

    cursor.renew(&txn).unwrap();
    assert_eq!(cursor.first().unwrap(), rec("k", "after"));
}

#[test]
fn test_renew_into_another_transaction() {
    let (_dir, env) = setup_test_env();
    let db = env.open_database(None, DbFlags::empty()).unwrap();
    fill(&env, db, &[("k", "v")]);

    let mut first = env.begin_transaction(TxnMode::ReadOnly).unwrap();
    let mut cursor = db.cursor(&first).unwrap();
    first.abort();

    let second = env.begin_transaction(TxnMode::ReadOnly).unwrap();
    cursor.renew(&second).unwrap();
    assert_eq!(cursor.first().unwrap(), rec("k", "v"));
}

#[test]
fn test_write_cursor_cannot_renew() {
    let (_dir, env) = setup_test_env();
    let db = env.open_database(None, DbFlags::empty()).unwrap();

    let writer = env.begin_transaction(TxnMode::ReadWrite).unwrap();
    let mut cursor = db.cursor(&writer).unwrap();
    drop(writer);

    let reader = env.begin_transaction(TxnMode::ReadOnly).unwrap();
    assert!(matches!(cursor.renew(&reader), Err(Error::InvariantViolation(_))));
}

#[test]
fn test_dupfixed_multiple() {
    let (_dir, env) = setup_test_env();
    let db = env
        .open_database(Some("fixed"), DbFlags::CREATE | DbFlags::DUPSORT | DbFlags::DUPFIXED)
        .unwrap();
    fill(&env, db, &[("k", "aa"), ("k", "bb"), ("k", "cc")]);

    let txn = env.begin_transaction(TxnMode::ReadOnly).unwrap();
    let mut cursor = db.cursor(&txn).unwrap();
    cursor.set_key(b"k").unwrap();
    let packed = cursor.get_multiple().unwrap().unwrap();
    assert_eq!(packed.key, b"k".to_vec());
    assert_eq!(packed.value, b"aabbcc".to_vec());
    assert_eq!(cursor.next_multiple().unwrap(), None);
}
