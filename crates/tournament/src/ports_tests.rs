use super::*;

#[tokio::test]
async fn test_invoice_lifecycle() {
    let wallet = SimulatedWallet::new();
    let invoice = wallet.create_invoice(WalletKind::Cashbox, 500).await.unwrap();

    assert_eq!(
        wallet.invoice_status(WalletKind::Cashbox, &invoice.reference).await,
        Ok(InvoiceStatus::Pending)
    );
    wallet.mark_paid(&invoice.reference).unwrap();
    assert_eq!(
        wallet.invoice_status(WalletKind::Cashbox, &invoice.reference).await,
        Ok(InvoiceStatus::Paid)
    );
    assert_eq!(wallet.balance(WalletKind::Cashbox), 500);
}

#[tokio::test]
async fn test_paying_own_invoice_moves_funds_between_wallets() {
    let wallet = SimulatedWallet::new();
    wallet.deposit(WalletKind::Cashbox, 1_000);
    let bank = wallet.create_invoice(WalletKind::Bank, 1).await.unwrap();

    let sent = wallet
        .pay(WalletKind::Cashbox, &bank.address, 600)
        .await
        .unwrap();
    assert_eq!(sent, 600);
    assert_eq!(wallet.balance(WalletKind::Cashbox), 400);
    assert_eq!(wallet.balance(WalletKind::Bank), 600);
    assert!(wallet.payouts().is_empty());

    let sent = wallet
        .pay(WalletKind::Bank, "bchtest:winner", 250)
        .await
        .unwrap();
    assert_eq!(sent, 250);
    assert_eq!(wallet.paid_to("bchtest:winner"), 250);
    assert_eq!(wallet.balance(WalletKind::Bank), 350);
}

#[tokio::test]
async fn test_outage_and_refusals() {
    let wallet = SimulatedWallet::new();
    wallet.deposit(WalletKind::Bank, 10);

    wallet.set_offline(true);
    assert!(matches!(
        wallet.create_invoice(WalletKind::Cashbox, 1).await,
        Err(PaymentError::Unreachable(_))
    ));
    wallet.set_offline(false);

    wallet.refuse_address("bad");
    assert!(matches!(
        wallet.pay(WalletKind::Bank, "bad", 1).await,
        Err(PaymentError::Rejected(_))
    ));
    assert!(matches!(
        wallet.pay(WalletKind::Bank, "good", 11).await,
        Err(PaymentError::Rejected(_))
    ));
}

#[tokio::test]
async fn test_sweep_drops_open_invoices_of_one_wallet() {
    let wallet = SimulatedWallet::new();
    wallet.create_invoice(WalletKind::Bank, 1).await.unwrap();
    wallet.create_invoice(WalletKind::Cashbox, 1).await.unwrap();

    wallet.sweep_invoices(WalletKind::Bank).await.unwrap();
    assert_eq!(wallet.open_invoices(WalletKind::Bank), 0);
    assert_eq!(wallet.open_invoices(WalletKind::Cashbox), 1);
}

#[tokio::test]
async fn test_recording_notifier() {
    let notifier = RecordingNotifier::new();
    notify_many(&notifier, &[1, 2], "hello").await;
    notifier.notify(2, "again").await;

    assert_eq!(notifier.messages_for(1), vec!["hello".to_string()]);
    assert!(notifier.received(2, "again"));
    assert_eq!(notifier.messages().len(), 3);
}
