use super::*;

pub(super) fn serve_http_with_workers(
    service: SharedService,
    bind_addr: &str,
    worker_count: usize,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(bind_addr)?;
    let worker_count = worker_count.max(1);
    let queue_capacity = worker_count * HTTP_QUEUE_CAPACITY_PER_WORKER;
    let (tx, rx) = mpsc::sync_channel::<TcpStream>(queue_capacity);
    let rx = Arc::new(Mutex::new(rx));
    info!(bind_addr, worker_count, queue_capacity, "roster transport listening");

    std::thread::scope(|scope| {
        for _ in 0..worker_count {
            let service = Arc::clone(&service);
            let rx = Arc::clone(&rx);
            scope.spawn(move || {
                loop {
                    let stream = {
                        let guard = match rx.lock() {
                            Ok(guard) => guard,
                            Err(_) => break,
                        };
                        match guard.recv() {
                            Ok(stream) => stream,
                            Err(_) => break,
                        }
                    };
                    if let Err(err) = handle_connection(&service, stream) {
                        warn!(error = %err, "roster transport error");
                    }
                }
            });
        }

        for stream in listener.incoming() {
            match stream {
                Ok(stream) => match tx.try_send(stream) {
                    Ok(()) => {}
                    Err(mpsc::TrySendError::Full(stream)) => {
                        warn!("roster transport queue full, rejecting connection");
                        if let Err(err) = write_backpressure_response(stream, SOCKET_TIMEOUT_SECS)
                        {
                            warn!(error = %err, "roster transport backpressure response failed");
                        }
                    }
                    Err(mpsc::TrySendError::Disconnected(_)) => {
                        error!("roster transport worker queue closed");
                        break;
                    }
                },
                Err(err) => warn!(error = %err, "roster transport accept error"),
            }
        }
        drop(tx);
    });

    Ok(())
}
