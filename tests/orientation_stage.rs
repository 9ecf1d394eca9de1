mod common;

use common::{assert_angle_close, column_values, eastbound, init_logger, northbound, Workspace};
use panomatch::pipeline::{orient_stage, yaw_stage};
use panomatch::{PipelineError, PipelineParams};

#[test]
fn test_orient_stage_resolves_logs() {
    init_logger();
    let ws = Workspace::new();
    // only the low-resolution log of run 0005 exists
    ws.write_gps_log("GL0005", &northbound(-90.0, 30.0, 50, 1e-5));
    ws.write_gps_log("GH0006", &eastbound(-90.0, 30.1, 50, 1e-5));
    ws.write(
        "matches.csv",
        "ObjectId,matched_file,frame_number\n\
         1,GH0005,25\n\
         2,GH0006,12.0\n\
         3,GH0006,0\n\
         4,GH0099,10\n\
         5,,\n\
         6,GH0006,49\n",
    );

    let output = ws.path("oriented.csv");
    let table = orient_stage(
        &ws.path("matches.csv"),
        &ws.gps_dir(),
        Some(&output),
        &PipelineParams::default(),
    )
    .unwrap();

    let col = table.column("orientation").unwrap();
    assert_angle_close(table.number(0, col).unwrap(), 0.0, 1e-6);
    assert_angle_close(table.number(1, col).unwrap(), 90.0, 1e-3);
    // no sample before frame 0, no sample after the last frame
    assert_eq!(table.cell(2, col), None);
    assert_eq!(table.cell(5, col), None);
    // unknown run and empty match
    assert_eq!(table.cell(3, col), None);
    assert_eq!(table.cell(4, col), None);

    assert!(output.is_file());
}

#[test]
fn test_window_limits_the_averaged_samples() {
    let ws = Workspace::new();
    // north for 10 samples, then east: with a 1-sample window the heading at frame 10 is
    // the bearing from frame 9 to frame 11
    let mut samples = northbound(-90.0, 30.0, 11, 1e-5);
    let corner = samples[10];
    samples.extend(eastbound(corner.0 + 1e-5, corner.1, 10, 1e-5));
    ws.write_gps_log("GH0007", &samples);
    ws.write("matches.csv", "ObjectId,matched_file,frame_number\n1,GH0007,10\n");

    let params = PipelineParams::builder()
        .window_frames(1)
        .average_samples(1)
        .build()
        .unwrap();
    let table = orient_stage(&ws.path("matches.csv"), &ws.gps_dir(), None, &params).unwrap();
    let heading = table.number(0, table.column("orientation").unwrap()).unwrap();
    assert!(heading > 30.0 && heading < 60.0, "heading = {heading}");
}

#[test]
fn test_missing_match_columns_are_fatal() {
    let ws = Workspace::new();
    ws.write("matches.csv", "ObjectId,file,frame\n1,GH0005,25\n");
    let err = orient_stage(
        &ws.path("matches.csv"),
        &ws.gps_dir(),
        None,
        &PipelineParams::default(),
    )
    .unwrap_err();
    match err {
        PipelineError::Schema { field, found, .. } => {
            assert_eq!(field, "matched_file");
            assert_eq!(found, vec!["ObjectId", "file", "frame"]);
        }
        other => panic!("expected a schema error, got {other:?}"),
    }
}

#[test]
fn test_yaw_stage_over_aliased_columns() {
    let ws = Workspace::new();
    ws.write(
        "oriented.csv",
        "ObjectId,x,y,camera_lon,camera_lat,heading\n\
         1,0.0,1.0,0.0,0.0,0\n\
         2,1.0,0.0,0.0,0.0,0\n\
         3,0.0,-1.0,0.0,0.0,90\n\
         4,0.0,1.0,0.0,0.0,\n",
    );
    let table = yaw_stage(&ws.path("oriented.csv"), None, &PipelineParams::default()).unwrap();
    assert_eq!(
        column_values(&table, "yaw"),
        vec![
            Some("-90".into()),
            Some("0".into()),
            Some("0".into()),
            None
        ]
    );
}
