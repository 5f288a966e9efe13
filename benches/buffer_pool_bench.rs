use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tempfile::TempDir;
use tupledb::{Config, Database, Field, PageId, Permission, TableId, Tuple, TupleDesc, Type};

fn setup_db(pool_pages: usize, pages: u32) -> (TempDir, Database, TableId) {
    let dir = TempDir::new().unwrap();
    let db = Database::new(Config::default().with_pool_pages(pool_pages)).unwrap();
    let table = db
        .create_table(dir.path().join("bench.dat"), "bench", TupleDesc::new(&[Type::Int]), None)
        .unwrap();
    let file = db.catalog().heap_file(table).unwrap();
    for _ in 0..pages {
        file.append_empty_page().unwrap();
    }
    (dir, db, table)
}

fn benchmark_get_page_hit(c: &mut Criterion) {
    let (_dir, db, table) = setup_db(16, 1);
    let tid = db.begin();
    let pid = PageId::new(table, 0);
    db.buffer_pool().get_page(tid, pid, Permission::ReadOnly).unwrap();

    c.bench_function("get_page_hit", |b| {
        b.iter(|| {
            let page = db
                .buffer_pool()
                .get_page(black_box(tid), black_box(pid), Permission::ReadOnly)
                .unwrap();
            black_box(page);
        })
    });
}

fn benchmark_get_page_eviction(c: &mut Criterion) {
    let (_dir, db, table) = setup_db(4, 16);
    let tid = db.begin();
    let mut page_no = 0;

    c.bench_function("get_page_evict_clean", |b| {
        b.iter(|| {
            page_no = (page_no + 1) % 16;
            let page = db
                .buffer_pool()
                .get_page(tid, PageId::new(table, page_no), Permission::ReadOnly)
                .unwrap();
            black_box(page);
        })
    });
}

fn benchmark_insert_commit(c: &mut Criterion) {
    let (_dir, db, table) = setup_db(64, 0);
    let schema = db.catalog().schema(table).unwrap();

    c.bench_function("insert_and_commit_10", |b| {
        b.iter(|| {
            let tid = db.begin();
            for v in 0..10 {
                let tuple = Tuple::new(schema.clone(), vec![Field::Int(v)]).unwrap();
                db.buffer_pool().insert_tuple(tid, table, tuple).unwrap();
            }
            db.commit(tid).unwrap();
        })
    });
}

criterion_group!(
    benches,
    benchmark_get_page_hit,
    benchmark_get_page_eviction,
    benchmark_insert_commit
);
criterion_main!(benches);
