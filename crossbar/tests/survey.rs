//! Survey fan-out, partial results, and the collection deadline.

mod common;

use std::thread;
use std::time::Duration;

use crossbar::prelude::*;

/// Three respondents, two of which answer inside the window: the surveyor
/// collects exactly those two, then times out, and the late answer is
/// silently dropped.
#[test]
fn partial_results_then_timeout() {
    common::init_tracing();
    let addr = common::unix_addr("survey-partial");

    let surveyor = SurveyorSocket::new().unwrap();
    surveyor.listen(&addr).unwrap();
    surveyor.set_survey_deadline(Duration::from_millis(400));

    let delays = [10u64, 20, 1_500];
    let mut responders = Vec::new();
    for (i, delay_ms) in delays.into_iter().enumerate() {
        let respondent = RespondentSocket::new().unwrap();
        respondent.dial_and_wait(&addr).unwrap();
        responders.push(thread::spawn(move || {
            let survey = respondent.recv().unwrap();
            assert_eq!(survey.payload(), b"status?");
            thread::sleep(Duration::from_millis(delay_ms));
            respondent.send(format!("worker-{i}").as_bytes()).unwrap();
            // Keep the socket alive long enough for the late response to
            // actually hit the wire before the socket closes.
            thread::sleep(Duration::from_millis(100));
        }));
    }

    assert!(common::wait_until(Duration::from_secs(2), || {
        surveyor.peer_count() == 3
    }));

    surveyor.send(b"status?").unwrap();

    let mut answers = Vec::new();
    loop {
        match surveyor.recv() {
            Ok(msg) => answers.push(String::from_utf8(msg.to_vec()).unwrap()),
            Err(e) => {
                assert!(e.is_timeout());
                break;
            }
        }
    }
    answers.sort();
    assert_eq!(answers, vec!["worker-0", "worker-1"]);

    // The survey ended with the window.
    assert!(matches!(
        surveyor.recv_timeout(Duration::from_millis(50)),
        Err(Error::InvalidState(_))
    ));

    for handle in responders {
        handle.join().unwrap();
    }
}

/// A second survey terminates the first; responses to the old identifier
/// are discarded.
#[test]
fn new_survey_discards_old_responses() {
    common::init_tracing();
    let addr = common::unix_addr("survey-replace");

    let surveyor = SurveyorSocket::new().unwrap();
    surveyor.listen(&addr).unwrap();
    surveyor.set_survey_deadline(Duration::from_secs(2));

    let respondent = RespondentSocket::new().unwrap();
    respondent.dial_and_wait(&addr).unwrap();

    assert!(common::wait_until(Duration::from_secs(2), || {
        surveyor.peer_count() == 1
    }));

    surveyor.send(b"round-one").unwrap();
    let survey = respondent.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(survey.payload(), b"round-one");

    // Start round two before the respondent answers round one.
    surveyor.send(b"round-two").unwrap();

    // The round-one answer goes out, correlates to the dead survey, and is
    // dropped. The round-two answer is delivered.
    respondent.send(b"stale-answer").unwrap();
    let survey = respondent.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(survey.payload(), b"round-two");
    respondent.send(b"fresh-answer").unwrap();

    let answer = surveyor.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(answer.payload(), b"fresh-answer");
}

#[test]
fn respondent_send_requires_pending_survey() {
    let respondent = RespondentSocket::new().unwrap();
    assert!(matches!(
        respondent.send(b"eager"),
        Err(Error::InvalidState(_))
    ));
}
