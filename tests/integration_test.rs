use std::io::Write;

use assert_cmd::Command;
use predicates as pred;
use tempfile::NamedTempFile;

#[test]
fn end_to_end_settles_a_job_and_reports_balances() {
    // worker 1 buys credits and wins job 7 (5 credits consumed), worker 3
    // applies and is rejected on acceptance (reservation released), client 2
    // funds and releases the escrow. The replayed release and the two bad
    // trailing rows must be rejected without halting the run.
    let mut file = NamedTempFile::new().expect("create temp file");
    writeln!(
        file,
        "op,user,job,amount,verified,first_three,subscription,micro,currency\n\
        credit,1,,20,,,,,\n\
        grant,3,,10,,,,,\n\
        apply,1,7,5,,,,,\n\
        apply,3,7,4,,,,,\n\
        escrow_create,2,7,100.00,,,,,\n\
        escrow_fund,2,7,,,,,,\n\
        accept,1,7,,,,,,\n\
        escrow_release,2,7,,true,,,,\n\
        escrow_release,2,7,,,,,,\n\
        reserve,9,8,10,,,,,\n\
        badop,1,,,,,,,"
    )
    .unwrap();

    let exe = env!("CARGO_BIN_EXE_settlement_core");
    let mut cmd = Command::new(exe);
    cmd.arg(file.path());

    cmd.assert()
        .success()
        .stdout(pred::str::contains(
            "user,balance,reserved,available,lifetime_purchased,lifetime_used",
        ))
        .stdout(pred::str::contains("1,15,0,15,20,5"))
        .stdout(pred::str::contains("3,10,0,10,0,0"))
        .stdout(pred::str::contains("9,0,0,0,0,0"))
        .stdout(pred::str::contains("job,client,amount,currency,status"))
        .stdout(pred::str::contains("7,2,100.00,EUR,released"));
}

#[test]
fn cancelling_an_escrow_releases_pending_reservations() {
    // the premature release (escrow never funded) must be rejected; the
    // cancellation then hands worker 1's reservation back
    let mut file = NamedTempFile::new().expect("create temp file");
    writeln!(
        file,
        "op,user,job,amount,verified,first_three,subscription,micro,currency\n\
        credit,1,,10,,,,,\n\
        apply,1,9,6,,,,,\n\
        escrow_create,5,9,50.00,,,,,USD\n\
        escrow_release,5,9,,,,,,\n\
        escrow_cancel,5,9,,,,,,"
    )
    .unwrap();

    let exe = env!("CARGO_BIN_EXE_settlement_core");
    let mut cmd = Command::new(exe);
    cmd.arg(file.path());

    cmd.assert()
        .success()
        .stdout(pred::str::contains("1,10,0,10,10,0"))
        .stdout(pred::str::contains("9,5,50.00,USD,cancelled"));
}
